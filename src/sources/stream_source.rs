use super::ByteSource;
use crate::length::ContentLength;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::io;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

/// A source that reads from a stream of byte chunks.
///
/// Chunks are split or merged as needed to fill the aggregator's reads. The
/// first `Err` item surfaces as a read error. Length is always unknown.
pub struct StreamSource<S>
where
  S: Stream<Item = io::Result<Bytes>>,
{
  reader: Option<StreamReader<S, Bytes>>,
}

impl<S> StreamSource<S>
where
  S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
{
  /// Wraps `stream`.
  pub fn new(stream: S) -> Self {
    Self {
      reader: Some(StreamReader::new(stream)),
    }
  }
}

#[async_trait]
impl<S> ByteSource for StreamSource<S>
where
  S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
{
  fn length(&self) -> ContentLength {
    ContentLength::Unknown
  }

  async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    match self.reader.as_mut() {
      Some(reader) => reader.read(buf).await,
      None => Ok(0),
    }
  }

  async fn close(&mut self) -> io::Result<()> {
    self.reader.take();
    Ok(())
  }
}
