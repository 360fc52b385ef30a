//! # Error Handling
//!
//! Errors raised while registering sources, reading from them, or writing the
//! aggregate into a sink.
//!
//! ## Overview
//!
//! The aggregator never throws across its drive loop. Failures are recorded
//! as a *sticky* first error (see [`FirstError`]) and the loop moves to
//! `Closed`. Callers observe the end of the stream and then consult
//! `StreamAggregator::error()` to tell a clean end from a failed one.
//!
//! ## Error Kinds
//!
//! - **SourceOpen**: a file could not be stat'ed/opened at registration time,
//!   or a source failed to open when it became current
//! - **SourceRead**: a source reported an I/O error mid-read
//! - **SinkWrite**: the sink rejected a write (including a zero-length accept)
//! - **AlreadyOpened / Closed**: lifecycle contract violations
//!
//! A declared-length mismatch at end of stream is *not* an error; it is
//! logged as a warning only.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Error type for every fallible aggregator operation.
///
/// I/O causes are held behind an `Arc` so the error can be cloned out of the
/// sticky slot and handed to several observers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AggregatorError {
  /// A source could not be opened or its size could not be resolved.
  #[error("failed to open source {}: {source}", path.display())]
  SourceOpen {
    /// Path (or descriptive label) of the source that failed.
    path: PathBuf,
    /// Underlying I/O error.
    #[source]
    source: Arc<io::Error>,
  },
  /// A source failed while being read.
  #[error("source read failed: {0}")]
  SourceRead(#[source] Arc<io::Error>),
  /// The sink rejected a write.
  #[error("sink write failed: {0}")]
  SinkWrite(#[source] Arc<io::Error>),
  /// An open mode was requested on an aggregator that is already open.
  #[error("aggregator is already open")]
  AlreadyOpened,
  /// An operation was requested on an aggregator that has been closed.
  #[error("aggregator is closed")]
  Closed,
  /// A detached open mode was requested outside a tokio runtime.
  #[error("no tokio runtime available to drive the aggregator")]
  NoRuntime,
}

impl AggregatorError {
  /// Wraps an I/O error raised while opening `path`.
  pub fn source_open(path: impl Into<PathBuf>, error: io::Error) -> Self {
    Self::SourceOpen {
      path: path.into(),
      source: Arc::new(error),
    }
  }

  /// Wraps an I/O error raised while reading from a source.
  pub fn source_read(error: io::Error) -> Self {
    Self::SourceRead(Arc::new(error))
  }

  /// Wraps an I/O error raised while writing to the sink.
  pub fn sink_write(error: io::Error) -> Self {
    Self::SinkWrite(Arc::new(error))
  }

  /// Returns the underlying I/O error kind, if this error carries one.
  pub fn io_kind(&self) -> Option<io::ErrorKind> {
    match self {
      Self::SourceOpen { source, .. } => Some(source.kind()),
      Self::SourceRead(e) | Self::SinkWrite(e) => Some(e.kind()),
      _ => None,
    }
  }
}

/// Sticky first-error slot.
///
/// Only the first call to [`FirstError::record`] is retained; every later
/// error (teardown failures included) is discarded.
#[derive(Debug, Default)]
pub struct FirstError {
  slot: OnceLock<AggregatorError>,
}

impl FirstError {
  /// Creates an empty slot.
  pub fn new() -> Self {
    Self::default()
  }

  /// Records `error` unless an error is already present.
  ///
  /// Returns `true` if this call populated the slot.
  pub fn record(&self, error: AggregatorError) -> bool {
    match self.slot.set(error) {
      Ok(()) => true,
      Err(discarded) => {
        debug!(error = %discarded, "discarding error, first error already recorded");
        false
      }
    }
  }

  /// Returns the recorded error, if any.
  pub fn get(&self) -> Option<&AggregatorError> {
    self.slot.get()
  }

  /// Returns `true` if an error has been recorded.
  pub fn is_set(&self) -> bool {
    self.slot.get().is_some()
  }
}
