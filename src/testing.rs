//! Sources and sinks with scripted behavior, shared by the unit tests.

use crate::length::ContentLength;
use crate::sources::ByteSource;
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Counts the lifecycle calls a [`ProbeSource`] received.
#[derive(Debug, Default)]
pub(crate) struct Probe {
  opened: AtomicUsize,
  closed: AtomicUsize,
  reads: AtomicUsize,
}

impl Probe {
  pub(crate) fn opened(&self) -> usize {
    self.opened.load(Ordering::SeqCst)
  }

  pub(crate) fn closed(&self) -> usize {
    self.closed.load(Ordering::SeqCst)
  }

  pub(crate) fn reads(&self) -> usize {
    self.reads.load(Ordering::SeqCst)
  }
}

/// A memory-backed source that can cap read sizes, fail, and report the
/// calls it received.
pub(crate) struct ProbeSource {
  data: Bytes,
  declared: ContentLength,
  chunk: usize,
  fail_after: Option<usize>,
  fail_open: bool,
  delivered: usize,
  probe: Arc<Probe>,
}

impl ProbeSource {
  pub(crate) fn new(data: impl Into<Bytes>) -> Self {
    let data = data.into();
    Self {
      declared: ContentLength::Known(data.len() as u64),
      data,
      chunk: usize::MAX,
      fail_after: None,
      fail_open: false,
      delivered: 0,
      probe: Arc::new(Probe::default()),
    }
  }

  /// Caps every read at `chunk` bytes.
  pub(crate) fn with_chunk(mut self, chunk: usize) -> Self {
    self.chunk = chunk.max(1);
    self
  }

  /// Fails the first read attempted after `n` bytes were delivered.
  pub(crate) fn failing_after(mut self, n: usize) -> Self {
    self.fail_after = Some(n);
    self
  }

  pub(crate) fn failing_open(mut self) -> Self {
    self.fail_open = true;
    self
  }

  pub(crate) fn declaring(mut self, length: ContentLength) -> Self {
    self.declared = length;
    self
  }

  pub(crate) fn probe(&self) -> Arc<Probe> {
    self.probe.clone()
  }
}

#[async_trait]
impl ByteSource for ProbeSource {
  fn length(&self) -> ContentLength {
    self.declared
  }

  fn label(&self) -> String {
    "probe".to_string()
  }

  async fn open(&mut self) -> io::Result<()> {
    self.probe.opened.fetch_add(1, Ordering::SeqCst);
    if self.fail_open {
      return Err(io::Error::new(io::ErrorKind::PermissionDenied, "probe open failure"));
    }
    Ok(())
  }

  async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    self.probe.reads.fetch_add(1, Ordering::SeqCst);
    if let Some(limit) = self.fail_after
      && self.delivered >= limit
    {
      return Err(io::Error::other("probe read failure"));
    }
    let mut n = buf.len().min(self.chunk).min(self.data.len());
    if let Some(limit) = self.fail_after {
      n = n.min(limit - self.delivered);
    }
    buf[..n].copy_from_slice(&self.data[..n]);
    self.data.advance(n);
    self.delivered += n;
    Ok(n)
  }

  async fn close(&mut self) -> io::Result<()> {
    self.probe.closed.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// A sink that accepts `accept` bytes in total, then fails every write.
#[derive(Debug)]
pub(crate) struct FailingSink {
  pub(crate) received: Vec<u8>,
  accept: usize,
  kind: io::ErrorKind,
}

impl FailingSink {
  pub(crate) fn after(accept: usize) -> Self {
    Self {
      received: Vec::new(),
      accept,
      kind: io::ErrorKind::ConnectionReset,
    }
  }
}

impl AsyncWrite for FailingSink {
  fn poll_write(
    self: Pin<&mut Self>,
    _cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    let this = self.get_mut();
    let room = this.accept - this.received.len();
    if room == 0 {
      return Poll::Ready(Err(io::Error::new(this.kind, "sink rejected write")));
    }
    let n = room.min(buf.len());
    this.received.extend_from_slice(&buf[..n]);
    Poll::Ready(Ok(n))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Ok(()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Ok(()))
  }
}

/// A sink that reports every write as accepting zero bytes.
#[derive(Debug, Default)]
pub(crate) struct ZeroSink;

impl AsyncWrite for ZeroSink {
  fn poll_write(
    self: Pin<&mut Self>,
    _cx: &mut Context<'_>,
    _buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    Poll::Ready(Ok(0))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Ok(()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Ok(()))
  }
}
