//! # bytechain
//!
//! Concatenate heterogeneous async byte sources into a single stream.
//!
//! bytechain presents an ordered list of byte sources (in-memory buffers,
//! files, async readers, chunk streams and channels, of known or unknown
//! length) as one logical byte stream. The aggregate can be read like any
//! `AsyncRead`, or pushed into any `AsyncWrite` sink that may accept only
//! part of each write.
//!
//! ## Key Features
//!
//! - **Seamless chaining**: consumers never observe where one source ends and
//!   the next begins
//! - **Bounded memory**: a fixed-capacity staging buffer with a half-full
//!   refill policy sits between the sources and the sink
//! - **Sticky errors**: the first source or sink failure is kept and exposed
//!   through [`StreamAggregator::error`]
//! - **Explicit lifecycle**: `Unopened -> Open -> Closed`, driven by the pure
//!   transition table in [`lifecycle`]
//!
//! ## Quick Start
//!
//! ```rust
//! use bytechain::{AggregatorConfig, StreamAggregator};
//!
//! # tokio_test::block_on(async {
//! let mut aggregator = StreamAggregator::with_config(AggregatorConfig::default().with_capacity(16));
//! aggregator.append_bytes("hello, ")?;
//! aggregator.append_bytes("world")?;
//!
//! let bytes = aggregator.collect_all().await?;
//! assert_eq!(bytes, b"hello, world");
//! assert_eq!(aggregator.bytes_written(), 12);
//! # Ok::<(), bytechain::AggregatorError>(())
//! # }).unwrap();
//! ```

#![deny(missing_docs)]

/// Multi-source aggregator facade and open modes.
pub mod aggregator;
/// Fixed-capacity staging buffer.
pub mod buffer;
/// Aggregator configuration.
pub mod config;
mod engine;
/// Error types and the sticky first-error slot.
pub mod error;
/// Declared content lengths.
pub mod length;
/// Lifecycle state machine.
pub mod lifecycle;
/// Bound pipe used by readable mode.
pub mod pipe;
/// In-memory sink.
pub mod sink;
/// Ordered source queue.
pub mod source_list;
/// Byte source trait and built-in sources.
pub mod sources;

pub use aggregator::StreamAggregator;
pub use config::AggregatorConfig;
pub use error::AggregatorError;
pub use length::ContentLength;
pub use lifecycle::State;
pub use pipe::AggregateStream;
pub use sink::MemorySink;
pub use sources::{ByteSource, ChannelSource, FileSource, MemorySource, ReaderSource, StreamSource};

#[cfg(test)]
mod aggregator_test;
#[cfg(test)]
mod testing;
