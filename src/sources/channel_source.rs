use super::{ByteSource, StreamSource};
use crate::length::ContentLength;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::Map;
use std::io;
use tokio::sync::mpsc::Receiver;
use tokio_stream::wrappers::ReceiverStream;

type ChunkStream = Map<ReceiverStream<Bytes>, fn(Bytes) -> io::Result<Bytes>>;

/// A source that reads chunks sent through a `tokio::sync::mpsc` channel.
///
/// Useful for feeding bytes produced by another task into the aggregate. The
/// source ends once every sender has been dropped and the channel is drained.
/// Length is always unknown.
pub struct ChannelSource {
  inner: StreamSource<ChunkStream>,
}

impl ChannelSource {
  /// Creates a source draining `receiver`.
  pub fn new(receiver: Receiver<Bytes>) -> Self {
    let ok: fn(Bytes) -> io::Result<Bytes> = Ok;
    Self {
      inner: StreamSource::new(ReceiverStream::new(receiver).map(ok)),
    }
  }
}

#[async_trait]
impl ByteSource for ChannelSource {
  fn length(&self) -> ContentLength {
    ContentLength::Unknown
  }

  fn label(&self) -> String {
    "channel".to_string()
  }

  async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    self.inner.read(buf).await
  }

  async fn close(&mut self) -> io::Result<()> {
    self.inner.close().await
  }
}
