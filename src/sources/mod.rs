//! # Byte Sources
//!
//! The [`ByteSource`] trait and the built-in sources that can be appended to
//! a [`StreamAggregator`](crate::StreamAggregator).
//!
//! ## Contract
//!
//! - `open` is called once, lazily, when the source reaches the front of the
//!   source list.
//! - `read` returns `Ok(n)` with `n > 0` for data, `Ok(0)` at end-of-source,
//!   and `Err` on failure. An empty destination buffer is never passed.
//! - `read` must be cancel safe: the aggregator may poll a read once and drop
//!   it when no data is ready, and no bytes may be lost when that happens.
//! - `close` is called once the source is exhausted, or during teardown if it
//!   was opened.
//!
//! ## Built-in Sources
//!
//! - [`MemorySource`]: an in-memory [`Bytes`](bytes::Bytes) buffer
//! - [`FileSource`]: a file on disk, sized at registration
//! - [`ReaderSource`]: any `AsyncRead` with a caller-declared length
//! - [`StreamSource`]: any stream of `io::Result<Bytes>` chunks
//! - [`ChannelSource`]: chunks pushed through a tokio mpsc channel

use crate::length::ContentLength;
use async_trait::async_trait;
use std::io;

/// Chunks received over a tokio mpsc channel.
pub mod channel_source;
/// Files on disk.
pub mod file_source;
/// In-memory buffers.
pub mod memory_source;
/// Arbitrary async readers.
pub mod reader_source;
/// Streams of byte chunks.
pub mod stream_source;

pub use channel_source::ChannelSource;
pub use file_source::FileSource;
pub use memory_source::MemorySource;
pub use reader_source::ReaderSource;
pub use stream_source::StreamSource;


/// A byte-producing object that can be opened, read in chunks, and closed.
#[async_trait]
pub trait ByteSource: Send {
  /// The declared length of this source.
  fn length(&self) -> ContentLength;

  /// Human-readable label used in errors and log records.
  fn label(&self) -> String {
    std::any::type_name::<Self>().to_string()
  }

  /// Prepares the source for reading.
  async fn open(&mut self) -> io::Result<()> {
    Ok(())
  }

  /// Reads up to `buf.len()` bytes into `buf`.
  ///
  /// Returns `Ok(0)` once the source is exhausted.
  async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

  /// Releases any resources held by the source.
  async fn close(&mut self) -> io::Result<()> {
    Ok(())
  }
}

#[async_trait]
impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
  fn length(&self) -> ContentLength {
    (**self).length()
  }

  fn label(&self) -> String {
    (**self).label()
  }

  async fn open(&mut self) -> io::Result<()> {
    (**self).open().await
  }

  async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    (**self).read(buf).await
  }

  async fn close(&mut self) -> io::Result<()> {
    (**self).close().await
  }
}
