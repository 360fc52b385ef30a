//! Configuration for a [`StreamAggregator`](crate::StreamAggregator).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default staging buffer capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 32 * 1024;

/// Default delay before re-checking a bound pipe whose read side is not yet
/// established.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Configuration for a stream aggregator.
///
/// Built with the `with_*` methods, or deserialized from any serde format.
/// Missing fields take their defaults.
///
/// # Example
///
/// ```rust
/// use bytechain::AggregatorConfig;
/// use std::time::Duration;
///
/// let config = AggregatorConfig::default()
///   .with_capacity(4096)
///   .with_retry_delay(Duration::from_millis(5))
///   .with_name("upload-body".to_string());
///
/// assert_eq!(config.capacity(), 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
  /// Staging buffer capacity in bytes. Never less than 1.
  pub capacity: usize,
  /// Capacity of the internal bound pipe used by readable mode. `None` uses
  /// the staging buffer capacity.
  pub pipe_capacity: Option<usize>,
  /// Retry delay for the bound-pipe readiness deferral, in milliseconds.
  /// Zero is treated as 1.
  pub retry_delay_ms: u64,
  /// Optional name used in log records.
  pub name: Option<String>,
}

impl Default for AggregatorConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
      pipe_capacity: None,
      retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
      name: None,
    }
  }
}

impl AggregatorConfig {
  /// Sets the staging buffer capacity. Zero is raised to 1.
  #[must_use]
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity.max(1);
    self
  }

  /// Sets the bound pipe capacity used by readable mode.
  #[must_use]
  pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
    self.pipe_capacity = Some(capacity.max(1));
    self
  }

  /// Sets the bound-pipe readiness retry delay, rounded up to whole
  /// milliseconds and never below 1 ms.
  #[must_use]
  pub fn with_retry_delay(mut self, delay: Duration) -> Self {
    let millis = delay.as_nanos().div_ceil(1_000_000);
    self.retry_delay_ms = u64::try_from(millis).unwrap_or(u64::MAX).max(1);
    self
  }

  /// Sets the name used in log records.
  #[must_use]
  pub fn with_name(mut self, name: String) -> Self {
    self.name = Some(name);
    self
  }

  /// Returns the effective staging buffer capacity.
  pub fn capacity(&self) -> usize {
    self.capacity.max(1)
  }

  /// Returns the effective bound pipe capacity.
  pub fn pipe_capacity(&self) -> usize {
    self.pipe_capacity.unwrap_or(self.capacity()).max(1)
  }

  /// Returns the bound-pipe readiness retry delay (at least 1 ms).
  pub fn retry_delay(&self) -> Duration {
    Duration::from_millis(self.retry_delay_ms.max(1))
  }

  /// Returns the configured name, or `"stream_aggregator"`.
  pub fn name(&self) -> String {
    self
      .name
      .clone()
      .unwrap_or_else(|| "stream_aggregator".to_string())
  }
}
