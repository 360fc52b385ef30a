use super::ByteSource;
use crate::length::ContentLength;
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A source wrapping any [`AsyncRead`] with a caller-declared length.
///
/// The reader is dropped on close. A declared length that turns out to be
/// wrong is not an error; the aggregator only warns about it at the end.
pub struct ReaderSource<R> {
  reader: Option<R>,
  length: ContentLength,
}

impl<R> ReaderSource<R>
where
  R: AsyncRead + Unpin + Send,
{
  /// Wraps `reader`, declaring `length` bytes.
  pub fn new(reader: R, length: impl Into<ContentLength>) -> Self {
    Self {
      reader: Some(reader),
      length: length.into(),
    }
  }

  /// Wraps `reader` whose length is not known in advance.
  pub fn unknown_length(reader: R) -> Self {
    Self::new(reader, ContentLength::Unknown)
  }
}

#[async_trait]
impl<R> ByteSource for ReaderSource<R>
where
  R: AsyncRead + Unpin + Send,
{
  fn length(&self) -> ContentLength {
    self.length
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
