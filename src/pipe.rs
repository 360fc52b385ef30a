//! # Bound Pipe
//!
//! The connected (write, read) pair used by readable mode. The aggregator
//! keeps the write half as its sink and hands the read half to the caller as
//! an [`AggregateStream`].
//!
//! The pair is a [`tokio::io::duplex`] channel, so writes see backpressure
//! once `capacity` bytes are in flight. On top of it, a [`PeerTracker`]
//! records whether the read half has been established (polled at least once)
//! or dropped. The drive loop defers writes while the read half is not yet
//! established and treats a dropped read half as an end-of-consumer signal.

use pin_project::{pin_project, pinned_drop};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, DuplexStream, ReadBuf};
use tracing::trace;

const PENDING: u8 = 0;
const READY: u8 = 1;
const CLOSED: u8 = 2;

/// Observable status of the read half of a bound pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
  /// Handed out, never polled.
  Pending,
  /// Polled at least once.
  Ready,
  /// Dropped by the consumer.
  Closed,
}

/// Shared status of the read half, written by the consumer side and read by
/// the drive loop.
#[derive(Debug, Default)]
pub struct PeerTracker {
  status: AtomicU8,
}

impl PeerTracker {
  /// Creates a tracker in the [`PeerStatus::Pending`] state.
  pub fn new() -> Self {
    Self::default()
  }

  /// Current status.
  pub fn status(&self) -> PeerStatus {
    match self.status.load(Ordering::Acquire) {
      PENDING => PeerStatus::Pending,
      READY => PeerStatus::Ready,
      _ => PeerStatus::Closed,
    }
  }

  fn mark_ready(&self) {
    let _ = self
      .status
      .compare_exchange(PENDING, READY, Ordering::AcqRel, Ordering::Acquire);
  }

  fn mark_closed(&self) {
    self.status.store(CLOSED, Ordering::Release);
  }
}

/// Creates a bound pipe holding at most `capacity` bytes in flight.
///
/// Returns the write half, the tracker for the read half, and the read half.
pub fn bound_pair(capacity: usize) -> (DuplexStream, Arc<PeerTracker>, AggregateStream) {
  trace!(capacity, "pipe::bound_pair()");
  let (writer, reader) = tokio::io::duplex(capacity.max(1));
  let peer = Arc::new(PeerTracker::new());
  let stream = AggregateStream {
    inner: reader,
    peer: peer.clone(),
  };
  (writer, peer, stream)
}

/// The readable view of an aggregate, returned by
/// [`StreamAggregator::open_readable`](crate::StreamAggregator::open_readable).
///
/// Reading yields the concatenation of every appended source and then
/// end-of-stream. End-of-stream is also reported when the aggregator stops
/// because of an error; check `StreamAggregator::error()` to tell the two
/// apart. Dropping the stream before the end closes the aggregator and
/// discards any unread data.
#[pin_project(PinnedDrop)]
#[derive(Debug)]
pub struct AggregateStream {
  #[pin]
  inner: DuplexStream,
  peer: Arc<PeerTracker>,
}

impl AsyncRead for AggregateStream {
  fn poll_read(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    let this = self.project();
    this.peer.mark_ready();
    this.inner.poll_read(cx, buf)
  }
}

#[pinned_drop]
impl PinnedDrop for AggregateStream {
  fn drop(self: Pin<&mut Self>) {
    self.peer.mark_closed();
  }
}
