use super::ByteSource;
use crate::length::ContentLength;
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use std::io;

/// A source backed by an in-memory buffer.
///
/// The buffer is cheaply cloned from whatever the caller hands over; reads
/// consume it from the front.
#[derive(Debug, Clone)]
pub struct MemorySource {
  data: Bytes,
  length: u64,
}

impl MemorySource {
  /// Creates a source over `data`.
  pub fn new(data: impl Into<Bytes>) -> Self {
    let data = data.into();
    Self {
      length: data.len() as u64,
      data,
    }
  }

  /// Returns the bytes not yet read.
  pub fn remaining(&self) -> &[u8] {
    &self.data
  }
}

#[async_trait]
impl ByteSource for MemorySource {
  fn length(&self) -> ContentLength {
    ContentLength::Known(self.length)
  }

  fn label(&self) -> String {
    format!("memory[{}]", self.length)
  }

  async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let n = buf.len().min(self.data.len());
    buf[..n].copy_from_slice(&self.data[..n]);
    self.data.advance(n);
    Ok(n)
  }
}
