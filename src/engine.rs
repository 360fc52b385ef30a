//! # Aggregation Engine
//!
//! The refill/drain cycle behind every open mode.
//!
//! ## Overview
//!
//! The engine owns the [`SourceList`], the [`StagingBuffer`] and the sink.
//! Its drive loop ([`Engine::run`]) repeatedly:
//!
//! 1. feeds the current [`Event`] into [`lifecycle::transition`],
//! 2. performs the returned [`Action`],
//! 3. derives the next event from the outcome.
//!
//! A `Writable` event stands for "the sink may take bytes"; the awaited write
//! itself provides the backpressure, so the loop yields to the runtime
//! whenever the sink is full or a source has nothing ready yet.
//!
//! ## Refill Policy
//!
//! After each partial drain the unwritten remainder is moved to the front of
//! the buffer. A refill is attempted only once the buffer is at most half
//! full, which amortizes refills over several writes while keeping enough
//! data resident that the sink is rarely starved.
//!
//! A refill only waits on a source while the buffer is empty. With bytes
//! still buffered, or once a refill has read something, sources are polled
//! without waiting, so data already read is never held back behind a source
//! that has nothing ready yet.

use crate::buffer::StagingBuffer;
use crate::error::{AggregatorError, FirstError};
use crate::length::ContentLength;
use crate::lifecycle::{self, Action, Event, State, Transition};
use crate::pipe::{PeerStatus, PeerTracker};
use crate::source_list::SourceList;
use futures::FutureExt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// State observable from outside the drive loop.
#[derive(Debug)]
pub(crate) struct Shared {
  state: watch::Sender<State>,
  bytes_written: AtomicU64,
  first_error: FirstError,
}

impl Shared {
  pub(crate) fn new() -> Self {
    let (state, _) = watch::channel(State::Unopened);
    Self {
      state,
      bytes_written: AtomicU64::new(0),
      first_error: FirstError::new(),
    }
  }

  pub(crate) fn state(&self) -> State {
    *self.state.borrow()
  }

  pub(crate) fn set_state(&self, state: State) {
    self.state.send_replace(state);
  }

  pub(crate) async fn wait_closed(&self) {
    let mut rx = self.state.subscribe();
    let _ = rx.wait_for(|state| *state == State::Closed).await;
  }

  pub(crate) fn bytes_written(&self) -> u64 {
    self.bytes_written.load(Ordering::Acquire)
  }

  pub(crate) fn first_error(&self) -> &FirstError {
    &self.first_error
  }
}

/// Reads up to `dst.len()` bytes, chaining across source boundaries.
///
/// Stops early when the sources run out. Only the first read of a call may
/// wait, and only if `wait` is set; every other read is polled once and the
/// call returns what it has as soon as a source has nothing ready. On a
/// source failure the error is recorded as sticky and no later source is
/// touched; bytes already read in this call are still returned, and the next
/// call reports the error.
pub(crate) async fn read_from_sources(
  sources: &mut SourceList,
  errors: &FirstError,
  dst: &mut [u8],
  wait: bool,
) -> Result<usize, AggregatorError> {
  if let Some(e) = errors.get() {
    return Err(e.clone());
  }

  let mut total = 0;
  while total < dst.len() {
    let Some(source) = sources.current() else {
      break;
    };
    let read = source.read(&mut dst[total..]);
    let result = if wait && total == 0 {
      read.await
    } else {
      match read.now_or_never() {
        Some(result) => result,
        None => break,
      }
    };
    let failure = match result {
      Ok(0) => match sources.advance().await {
        Ok(true) => continue,
        Ok(false) => break,
        Err(e) => e,
      },
      Ok(n) => {
        total += n;
        continue;
      }
      Err(e) => {
        error!(label = %source.label(), error = %e, "Failed to read from source");
        AggregatorError::source_read(e)
      }
    };
    errors.record(failure.clone());
    return if total > 0 { Ok(total) } else { Err(failure) };
  }
  Ok(total)
}

/// The drive engine for one open session.
pub(crate) struct Engine<W> {
  name: String,
  sources: SourceList,
  buffer: StagingBuffer,
  sink: Option<W>,
  declared: ContentLength,
  peer: Option<Arc<PeerTracker>>,
  retry_delay: Duration,
  shared: Arc<Shared>,
}

impl<W> Engine<W>
where
  W: AsyncWrite + Unpin + Send,
{
  pub(crate) fn new(
    name: String,
    sources: SourceList,
    capacity: usize,
    sink: W,
    shared: Arc<Shared>,
  ) -> Self {
    Self {
      name,
      declared: sources.total_length(),
      sources,
      buffer: StagingBuffer::new(capacity),
      sink: Some(sink),
      peer: None,
      retry_delay: crate::config::DEFAULT_RETRY_DELAY,
      shared,
    }
  }

  /// Attaches the tracker of a bound pipe's read half.
  pub(crate) fn with_peer(mut self, peer: Arc<PeerTracker>, retry_delay: Duration) -> Self {
    self.peer = Some(peer);
    self.retry_delay = retry_delay;
    self
  }

  #[cfg(test)]
  pub(crate) fn buffer(&self) -> &StagingBuffer {
    &self.buffer
  }

  #[cfg(test)]
  pub(crate) fn sink(&self) -> Option<&W> {
    self.sink.as_ref()
  }

  /// Opens the first source and performs one refill.
  pub(crate) async fn prime(&mut self) {
    trace!(component = %self.name, "Engine::prime()");
    match self.sources.advance().await {
      Ok(true) => {
        self.refill().await;
      }
      Ok(false) => debug!(component = %self.name, "no sources to aggregate"),
      Err(e) => {
        error!(component = %self.name, error = %e, "Failed to open first source");
        self.shared.first_error.record(e);
      }
    }
  }

  /// Fills the free tail of the buffer from the sources.
  ///
  /// Waits for a source only while the buffer is empty; with bytes still
  /// pending it takes whatever is ready right now. Returns `false` when
  /// nothing was read, because the sources are exhausted, failed, or have
  /// nothing ready.
  pub(crate) async fn refill(&mut self) -> bool {
    let wait = self.buffer.is_empty();
    match read_from_sources(
      &mut self.sources,
      &self.shared.first_error,
      self.buffer.spare_mut(),
      wait,
    )
    .await
    {
      Ok(0) | Err(_) => false,
      Ok(n) => {
        self.buffer.commit(n);
        true
      }
    }
  }

  /// Writes buffered bytes to the sink once.
  ///
  /// Returns whether the buffer still holds data afterwards. The caller must
  /// not invoke this on an empty buffer.
  pub(crate) async fn drain_once(&mut self) -> Result<bool, AggregatorError> {
    debug_assert!(!self.buffer.is_empty(), "drain_once on an empty buffer");
    if self.buffer.is_empty() {
      return Ok(false);
    }
    let Some(sink) = self.sink.as_mut() else {
      return Err(AggregatorError::Closed);
    };

    let written = match sink.write(self.buffer.filled()).await {
      Ok(0) => Err(io::Error::new(
        io::ErrorKind::WriteZero,
        "sink accepted zero bytes",
      )),
      result => result,
    };
    let n = match written {
      Ok(n) => n,
      Err(e) => {
        let failure = AggregatorError::sink_write(e);
        if !self.is_peer_gone(&failure) {
          error!(component = %self.name, error = %failure, "Failed to write to sink");
          self.shared.first_error.record(failure.clone());
        }
        return Err(failure);
      }
    };

    self.shared.bytes_written.fetch_add(n as u64, Ordering::AcqRel);
    self.buffer.consume(n);
    if self.buffer.is_at_most_half_full() {
      self.refill().await;
    }
    Ok(!self.buffer.is_empty())
  }

  /// Drives the session to completion, returning the sink if it was shut
  /// down cleanly.
  pub(crate) async fn run(mut self, cancel: CancellationToken) -> Option<W> {
    debug!(component = %self.name, declared = %self.declared, "drive loop started");
    let mut event = Event::OpenCompleted;
    loop {
      let Transition { next, action } = lifecycle::transition(self.shared.state(), event);
      trace!(component = %self.name, ?event, ?action, "lifecycle transition");

      event = match action {
        Action::Prime => {
          tokio::select! {
            biased;
            _ = cancel.cancelled() => Event::CloseRequested,
            event = self.prime_step() => event,
          }
        }
        Action::Drain => {
          tokio::select! {
            biased;
            _ = cancel.cancelled() => Event::CloseRequested,
            event = self.pump() => event,
          }
        }
        Action::Defer => {
          let delay = self.retry_delay;
          trace!(component = %self.name, ?delay, "read side not established, deferring");
          tokio::select! {
            biased;
            _ = cancel.cancelled() => Event::CloseRequested,
            _ = tokio::time::sleep(delay) => self.readiness(),
          }
        }
        Action::Finish => {
          let sink = self.finish().await;
          self.shared.set_state(next);
          return sink;
        }
        Action::Teardown => {
          self.teardown().await;
          self.shared.set_state(next);
          return None;
        }
        Action::Attach | Action::Reject | Action::Ignore => {
          warn!(component = %self.name, ?event, ?action, "unexpected event in drive loop");
          self.teardown().await;
          self.shared.set_state(State::Closed);
          return None;
        }
      };
    }
  }

  async fn prime_step(&mut self) -> Event {
    self.prime().await;
    self.readiness()
  }

  /// Handles one writable event: refill if empty, then drain once.
  async fn pump(&mut self) -> Event {
    if self.buffer.is_empty() && !self.refill().await {
      return Event::Exhausted;
    }
    match self.drain_once().await {
      Ok(true) => self.readiness(),
      Ok(false) => Event::Exhausted,
      Err(e) if self.is_peer_gone(&e) => Event::PeerClosed,
      Err(_) => Event::Failed,
    }
  }

  /// The readiness event for the sink as it stands now.
  fn readiness(&self) -> Event {
    match self.peer.as_ref().map(|peer| peer.status()) {
      None | Some(PeerStatus::Ready) => Event::Writable { peer_ready: true },
      Some(PeerStatus::Pending) => Event::Writable { peer_ready: false },
      Some(PeerStatus::Closed) => Event::PeerClosed,
    }
  }

  fn is_peer_gone(&self, error: &AggregatorError) -> bool {
    self.peer.is_some() && error.io_kind() == Some(io::ErrorKind::BrokenPipe)
  }

  /// End of data: check the declared length, shut the sink down, release.
  async fn finish(&mut self) -> Option<W> {
    let written = self.shared.bytes_written();
    if let ContentLength::Known(expected) = self.declared
      && expected != written
    {
      warn!(
        component = %self.name,
        expected,
        written,
        "delivered length differs from declared length"
      );
    }

    if let Some(sink) = self.sink.as_mut()
      && let Err(e) = sink.shutdown().await
    {
      let failure = AggregatorError::sink_write(e);
      if !self.is_peer_gone(&failure) {
        warn!(component = %self.name, error = %failure, "Failed to shut down sink");
        self.shared.first_error.record(failure);
      }
    }

    let sink = self.sink.take();
    self.release().await;
    debug!(component = %self.name, written, "aggregate complete");
    sink
  }

  /// Hard stop: drop the sink without flushing and release everything.
  async fn teardown(&mut self) {
    debug!(
      component = %self.name,
      discarded = self.buffer.len(),
      "tearing down aggregate"
    );
    self.sink.take();
    self.release().await;
  }

  async fn release(&mut self) {
    self.buffer.release();
    self.sources.clear().await;
  }
}
