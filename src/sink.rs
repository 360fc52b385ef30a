//! In-memory sink used by [`StreamAggregator::collect_all`](crate::StreamAggregator::collect_all).

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// An [`AsyncWrite`] that appends everything to a `Vec<u8>`.
///
/// With [`MemorySink::with_max_write`] each write accepts at most the given
/// number of bytes, which exercises the partial-write paths of a drain.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
  data: Vec<u8>,
  max_write: Option<usize>,
  shutdown: bool,
}

impl MemorySink {
  /// Creates an empty sink that accepts whole writes.
  pub fn new() -> Self {
    Self::default()
  }

  /// Limits every write to at most `max` bytes (at least 1).
  #[must_use]
  pub fn with_max_write(mut self, max: usize) -> Self {
    self.max_write = Some(max.max(1));
    self
  }

  /// Bytes received so far.
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Returns `true` once the sink has been shut down.
  pub fn is_shutdown(&self) -> bool {
    self.shutdown
  }

  /// Consumes the sink, returning the received bytes.
  pub fn into_inner(self) -> Vec<u8> {
    self.data
  }
}

impl AsyncWrite for MemorySink {
  fn poll_write(
    self: Pin<&mut Self>,
    _cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    let this = self.get_mut();
    if this.shutdown {
      return Poll::Ready(Err(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "memory sink is shut down",
      )));
    }
    let n = this.max_write.map_or(buf.len(), |max| buf.len().min(max));
    this.data.extend_from_slice(&buf[..n]);
    Poll::Ready(Ok(n))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Ok(()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    self.get_mut().shutdown = true;
    Poll::Ready(Ok(()))
  }
}
