//! # Source List
//!
//! Ordered queue of byte sources plus the aggregate declared length.
//!
//! Sources are consumed strictly from the front. The front source is opened
//! lazily by [`SourceList::advance`]; once it reports end-of-source it is
//! closed, removed and never revisited. `advance` is the only place where one
//! source hands over to the next, which is what keeps the seams invisible to
//! whoever reads the aggregate.

use crate::error::AggregatorError;
use crate::length::ContentLength;
use crate::sources::{ByteSource, MemorySource};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// An ordered, front-consumed sequence of byte sources.
pub struct SourceList {
  /// Pending sources; the front one is current once opened.
  sources: VecDeque<Box<dyn ByteSource>>,
  /// Sum of declared lengths, or unknown.
  total: ContentLength,
  /// Whether the front source has been opened.
  current_open: bool,
}

impl Default for SourceList {
  fn default() -> Self {
    Self::new()
  }
}

impl SourceList {
  /// Creates an empty list with a known total length of zero.
  pub fn new() -> Self {
    Self {
      sources: VecDeque::new(),
      total: ContentLength::ZERO,
      current_open: false,
    }
  }

  /// Appends `source`, folding its declared length into the total.
  ///
  /// An unknown length makes the total unknown for the rest of the list's
  /// life.
  pub fn push(&mut self, source: Box<dyn ByteSource>) {
    let length = source.length();
    trace!(label = %source.label(), length = %length, "SourceList::push()");
    self.total += length;
    self.sources.push_back(source);
  }

  /// Appends `data` as a memory source. Empty input is ignored.
  pub fn push_bytes(&mut self, data: impl Into<Bytes>) {
    let data = data.into();
    if data.is_empty() {
      return;
    }
    self.push(Box::new(MemorySource::new(data)));
  }

  /// Sum of all declared lengths, or [`ContentLength::Unknown`].
  pub fn total_length(&self) -> ContentLength {
    self.total
  }

  /// Number of sources not yet discarded, the current one included.
  pub fn len(&self) -> usize {
    self.sources.len()
  }

  /// Returns `true` if no sources remain.
  pub fn is_empty(&self) -> bool {
    self.sources.is_empty()
  }

  /// The opened front source, if any.
  pub fn current(&mut self) -> Option<&mut Box<dyn ByteSource>> {
    if self.current_open {
      self.sources.front_mut()
    } else {
      None
    }
  }

  /// Closes and discards the current source, then opens the next one.
  ///
  /// Returns `Ok(true)` if a new current source is available, `Ok(false)` if
  /// the list is exhausted.
  ///
  /// # Errors
  ///
  /// Returns [`AggregatorError::SourceOpen`] if the next source fails to
  /// open. It stays at the front, unopened, so [`SourceList::current`]
  /// yields nothing afterwards.
  pub async fn advance(&mut self) -> Result<bool, AggregatorError> {
    if self.current_open {
      self.current_open = false;
      if let Some(mut finished) = self.sources.pop_front() {
        debug!(label = %finished.label(), "source exhausted");
        if let Err(e) = finished.close().await {
          warn!(label = %finished.label(), error = %e, "Failed to close exhausted source");
        }
      }
    }

    let Some(next) = self.sources.front_mut() else {
      return Ok(false);
    };
    next
      .open()
      .await
      .map_err(|e| AggregatorError::source_open(next.label(), e))?;
    self.current_open = true;
    Ok(true)
  }

  /// Closes the current source, if opened, and drops every remaining one.
  pub async fn clear(&mut self) {
    if self.current_open {
      self.current_open = false;
      if let Some(mut current) = self.sources.pop_front()
        && let Err(e) = current.close().await
      {
        warn!(label = %current.label(), error = %e, "Failed to close source during teardown");
      }
    }
    self.sources.clear();
  }
}
