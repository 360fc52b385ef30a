//! # Stream Aggregator
//!
//! The public face of the crate: register sources, pick an open mode, and
//! observe the outcome.
//!
//! ## Open Modes
//!
//! - [`StreamAggregator::open_readable`]: pull mode. Returns an
//!   [`AggregateStream`] the caller reads from; a detached task pushes the
//!   aggregate into the other end of a bound pipe.
//! - [`StreamAggregator::open_into`]: push mode. A detached task writes the
//!   aggregate into a caller-supplied sink.
//! - [`StreamAggregator::drive_into`]: push mode driven inline; resolves with
//!   the sink once the aggregate has been delivered.
//! - [`StreamAggregator::collect_all`]: `drive_into` an in-memory sink.
//!
//! Exactly one open call is allowed per aggregator; any further one is
//! rejected with [`AggregatorError::AlreadyOpened`] or
//! [`AggregatorError::Closed`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytechain::StreamAggregator;
//! use tokio::io::AsyncReadExt;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut aggregator = StreamAggregator::new();
//! aggregator.append_bytes("--boundary\r\n")?;
//! aggregator.append_file("payload.bin").await?;
//! aggregator.append_bytes("\r\n--boundary--\r\n")?;
//!
//! let mut stream = aggregator.open_readable()?;
//! let mut body = Vec::new();
//! stream.read_to_end(&mut body).await?;
//!
//! if let Some(e) = aggregator.error() {
//!   return Err(e.clone().into());
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::AggregatorConfig;
use crate::engine::{Engine, Shared};
use crate::error::AggregatorError;
use crate::length::ContentLength;
use crate::lifecycle::{self, Action, Event, State};
use crate::pipe::{self, AggregateStream};
use crate::sink::MemorySink;
use crate::source_list::SourceList;
use crate::sources::{ByteSource, ChannelSource, FileSource, ReaderSource, StreamSource};
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Presents an ordered list of byte sources as one byte stream.
pub struct StreamAggregator {
  /// Configuration, including buffer capacity and name.
  config: AggregatorConfig,
  /// Sources not yet handed to a drive loop.
  sources: Option<SourceList>,
  /// Declared aggregate length captured when the sources were handed over.
  declared: ContentLength,
  /// State shared with the drive loop.
  shared: Arc<Shared>,
  /// Stops a detached drive loop.
  cancel: CancellationToken,
  /// Detached drive loop, if one was spawned.
  driver: Option<JoinHandle<()>>,
}

impl Default for StreamAggregator {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Debug for StreamAggregator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StreamAggregator")
      .field("name", &self.config.name())
      .field("state", &self.state())
      .field("content_length", &self.content_length())
      .field("bytes_written", &self.bytes_written())
      .field("error", &self.error())
      .finish()
  }
}

impl StreamAggregator {
  /// Creates an aggregator with the default configuration (32 KiB buffer).
  pub fn new() -> Self {
    Self::with_config(AggregatorConfig::default())
  }

  /// Creates an aggregator with `config`.
  pub fn with_config(config: AggregatorConfig) -> Self {
    Self {
      config,
      sources: Some(SourceList::new()),
      declared: ContentLength::ZERO,
      shared: Arc::new(Shared::new()),
      cancel: CancellationToken::new(),
      driver: None,
    }
  }

  /// The configuration this aggregator was built with.
  pub fn config(&self) -> &AggregatorConfig {
    &self.config
  }

  /// Name used in log records.
  pub fn name(&self) -> String {
    self.config.name()
  }

  /// Staging buffer capacity in bytes.
  pub fn capacity(&self) -> usize {
    self.config.capacity()
  }

  /// Current lifecycle state.
  pub fn state(&self) -> State {
    self.shared.state()
  }

  /// Total bytes the sink has accepted so far.
  pub fn bytes_written(&self) -> u64 {
    self.shared.bytes_written()
  }

  /// The first error encountered by any source or the sink, if any.
  pub fn error(&self) -> Option<&AggregatorError> {
    self.shared.first_error().get()
  }

  /// Sum of the declared source lengths, or [`ContentLength::Unknown`] if any
  /// source declared an unknown length.
  pub fn content_length(&self) -> ContentLength {
    match &self.sources {
      Some(sources) => sources.total_length(),
      None => self.declared,
    }
  }

  fn sources_mut(&mut self) -> Result<&mut SourceList, AggregatorError> {
    match self.state() {
      State::Unopened => self.sources.as_mut().ok_or(AggregatorError::AlreadyOpened),
      State::Open => Err(AggregatorError::AlreadyOpened),
      State::Closed => Err(AggregatorError::Closed),
    }
  }

  /// Appends an in-memory buffer. Empty input is ignored.
  ///
  /// # Errors
  ///
  /// Fails if the aggregator has already been opened or closed.
  pub fn append_bytes(&mut self, data: impl Into<Bytes>) -> Result<(), AggregatorError> {
    self.sources_mut()?.push_bytes(data);
    Ok(())
  }

  /// Appends the file at `path`, sized and opened immediately.
  ///
  /// # Errors
  ///
  /// Returns [`AggregatorError::SourceOpen`] if the file cannot be stat'ed or
  /// opened; nothing is appended in that case.
  pub async fn append_file(&mut self, path: impl AsRef<Path>) -> Result<(), AggregatorError> {
    self.sources_mut()?;
    let source = FileSource::open_path(path).await?;
    self.sources_mut()?.push(Box::new(source));
    Ok(())
  }

  /// Appends an arbitrary source; its declared length is taken from
  /// [`ByteSource::length`].
  ///
  /// # Errors
  ///
  /// Fails if the aggregator has already been opened or closed.
  pub fn append_source<S>(&mut self, source: S) -> Result<(), AggregatorError>
  where
    S: ByteSource + 'static,
  {
    self.sources_mut()?.push(Box::new(source));
    Ok(())
  }

  /// Appends an async reader declaring `length` bytes, which may be
  /// [`ContentLength::Unknown`].
  ///
  /// # Errors
  ///
  /// Fails if the aggregator has already been opened or closed.
  pub fn append_reader<R>(
    &mut self,
    reader: R,
    length: impl Into<ContentLength>,
  ) -> Result<(), AggregatorError>
  where
    R: AsyncRead + Unpin + Send + 'static,
  {
    self.append_source(ReaderSource::new(reader, length))
  }

  /// Appends the chunks received on `receiver`, until all senders are gone.
  ///
  /// # Errors
  ///
  /// Fails if the aggregator has already been opened or closed.
  pub fn append_channel(&mut self, receiver: Receiver<Bytes>) -> Result<(), AggregatorError> {
    self.append_source(ChannelSource::new(receiver))
  }

  /// Appends a stream of byte chunks.
  ///
  /// # Errors
  ///
  /// Fails if the aggregator has already been opened or closed.
  pub fn append_stream<S>(&mut self, stream: S) -> Result<(), AggregatorError>
  where
    S: Stream<Item = io::Result<Bytes>> + Unpin + Send + 'static,
  {
    self.append_source(StreamSource::new(stream))
  }

  /// Moves `Unopened -> Open` and hands the sources over.
  fn begin(&mut self) -> Result<SourceList, AggregatorError> {
    let state = self.state();
    let transition = lifecycle::transition(state, Event::OpenRequested);
    if transition.action != Action::Attach {
      debug!(component = %self.name(), ?state, "rejecting second open");
      return Err(match state {
        State::Closed => AggregatorError::Closed,
        _ => AggregatorError::AlreadyOpened,
      });
    }
    let sources = self.sources.take().ok_or(AggregatorError::AlreadyOpened)?;
    self.declared = sources.total_length();
    self.shared.set_state(transition.next);
    Ok(sources)
  }

  /// Opens the aggregate as a readable stream.
  ///
  /// A bound pipe is created; its write half becomes the sink of a drive
  /// loop spawned on the current tokio runtime, and its read half is
  /// returned. Writes are deferred until the returned stream is first polled.
  ///
  /// # Errors
  ///
  /// - [`AggregatorError::NoRuntime`] outside a tokio runtime
  /// - [`AggregatorError::AlreadyOpened`] / [`AggregatorError::Closed`] on a
  ///   second open
  pub fn open_readable(&mut self) -> Result<AggregateStream, AggregatorError> {
    trace!(component = %self.name(), "StreamAggregator::open_readable()");
    let runtime = Handle::try_current().map_err(|_| AggregatorError::NoRuntime)?;
    let sources = self.begin()?;

    let (writer, peer, stream) = pipe::bound_pair(self.config.pipe_capacity());
    let engine = Engine::new(
      self.name(),
      sources,
      self.capacity(),
      writer,
      self.shared.clone(),
    )
    .with_peer(peer, self.config.retry_delay());
    let cancel = self.cancel.clone();
    self.driver = Some(runtime.spawn(async move {
      engine.run(cancel).await;
    }));
    Ok(stream)
  }

  /// Opens the aggregate as a stream of byte chunks.
  ///
  /// Same as [`StreamAggregator::open_readable`], with the reader wrapped in a
  /// [`ReaderStream`] yielding chunks of at most the buffer capacity.
  ///
  /// # Errors
  ///
  /// As for [`StreamAggregator::open_readable`].
  pub fn open_byte_stream(&mut self) -> Result<ReaderStream<AggregateStream>, AggregatorError> {
    let capacity = self.capacity();
    let stream = self.open_readable()?;
    Ok(ReaderStream::with_capacity(stream, capacity))
  }

  /// Pushes the aggregate into `sink` from a detached task.
  ///
  /// Returns once the task is spawned; use [`StreamAggregator::closed`] to
  /// wait for completion. The sink is shut down after the last byte and
  /// dropped without flushing on error or [`StreamAggregator::close`].
  ///
  /// # Errors
  ///
  /// - [`AggregatorError::NoRuntime`] outside a tokio runtime
  /// - [`AggregatorError::AlreadyOpened`] / [`AggregatorError::Closed`] on a
  ///   second open
  pub fn open_into<W>(&mut self, sink: W) -> Result<(), AggregatorError>
  where
    W: AsyncWrite + Unpin + Send + 'static,
  {
    trace!(component = %self.name(), "StreamAggregator::open_into()");
    let runtime = Handle::try_current().map_err(|_| AggregatorError::NoRuntime)?;
    let sources = self.begin()?;

    let engine = Engine::new(
      self.name(),
      sources,
      self.capacity(),
      sink,
      self.shared.clone(),
    );
    let cancel = self.cancel.clone();
    self.driver = Some(runtime.spawn(async move {
      engine.run(cancel).await;
    }));
    Ok(())
  }

  /// Pushes the aggregate into `sink` on the calling task and returns the
  /// sink once everything has been delivered and the sink shut down.
  ///
  /// # Errors
  ///
  /// Returns the sticky first error if any source or the sink failed, or a
  /// lifecycle error on a second open.
  pub async fn drive_into<W>(&mut self, sink: W) -> Result<W, AggregatorError>
  where
    W: AsyncWrite + Unpin + Send,
  {
    trace!(component = %self.name(), "StreamAggregator::drive_into()");
    let sources = self.begin()?;

    let engine = Engine::new(
      self.name(),
      sources,
      self.capacity(),
      sink,
      self.shared.clone(),
    );
    let sink = engine.run(self.cancel.clone()).await;
    match (self.error(), sink) {
      (Some(e), _) => Err(e.clone()),
      (None, Some(sink)) => Ok(sink),
      (None, None) => Err(AggregatorError::Closed),
    }
  }

  /// Collects the whole aggregate into memory.
  ///
  /// # Errors
  ///
  /// As for [`StreamAggregator::drive_into`].
  pub async fn collect_all(&mut self) -> Result<Vec<u8>, AggregatorError> {
    let sink = self.drive_into(MemorySink::new()).await?;
    Ok(sink.into_inner())
  }

  /// Stops the aggregator and releases every resource.
  ///
  /// Unopened sources are dropped immediately. A running drive loop is told to
  /// stop; it discards buffered data and drops the sink at its next await
  /// point. Calling `close` again, or after completion, does nothing.
  pub fn close(&mut self) {
    let state = self.state();
    let transition = lifecycle::transition(state, Event::CloseRequested);
    trace!(component = %self.name(), ?state, action = ?transition.action, "StreamAggregator::close()");
    match state {
      State::Unopened => {
        self.sources.take();
        self.shared.set_state(transition.next);
      }
      State::Open => self.cancel.cancel(),
      State::Closed => {}
    }
  }

  /// Resolves once the aggregator has reached [`State::Closed`].
  pub async fn closed(&self) {
    self.shared.wait_closed().await;
  }

  /// Returns `true` once a detached drive loop has exited.
  pub fn is_finished(&self) -> bool {
    self.driver.as_ref().is_none_or(|driver| driver.is_finished())
  }
}
