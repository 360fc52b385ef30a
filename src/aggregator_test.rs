//! # Stream Aggregator Test Suite
//!
//! End-to-end behavior of [`StreamAggregator`] across its open modes.
//!
//! ## Test Coverage
//!
//! - **Delivery**: byte-exact concatenation for every buffer capacity, with
//!   whole and partial sink writes
//! - **Content length**: known sums, unknown poisoning, advisory mismatches
//! - **Lifecycle**: single open, append after open, close before and during
//!   a session, idempotent close
//! - **Errors**: source failures mid-stream, sink failures, registration
//!   failures, missing runtime
//! - **Readable mode**: chunked reads, early drop of the consumer

use crate::aggregator::StreamAggregator;
use crate::config::AggregatorConfig;
use crate::error::AggregatorError;
use crate::length::ContentLength;
use crate::lifecycle::State;
use crate::sink::MemorySink;
use crate::testing::{FailingSink, ProbeSource};
use bytes::Bytes;
use futures::StreamExt;
use proptest::prelude::*;
use std::io::Write;
use std::time::Duration;
use tokio::io::AsyncReadExt;

fn aggregator_with_capacity(capacity: usize) -> StreamAggregator {
  StreamAggregator::with_config(AggregatorConfig::default().with_capacity(capacity))
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
  (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

#[tokio::test]
async fn test_two_sources_through_a_small_buffer() {
  let first = pattern(70, 0);
  let second = pattern(100, 128);
  let mut aggregator = aggregator_with_capacity(16);
  aggregator.append_bytes(first.clone()).unwrap();
  aggregator.append_bytes(second.clone()).unwrap();
  assert_eq!(aggregator.content_length(), ContentLength::Known(170));
  assert_eq!(aggregator.state(), State::Unopened);

  let bytes = aggregator.collect_all().await.unwrap();

  assert_eq!(bytes, [first, second].concat());
  assert_eq!(aggregator.bytes_written(), 170);
  assert_eq!(aggregator.state(), State::Closed);
  assert!(aggregator.error().is_none());
}

#[tokio::test]
async fn test_every_capacity_delivers_the_same_bytes() {
  let parts: [&'static [u8]; 3] = [b"a", b"bcdefghij", b"klmnopqrstuvwxyz0123456789"];
  let expected = parts.concat();

  for capacity in 1..=expected.len() + 5 {
    let mut aggregator = aggregator_with_capacity(capacity);
    for part in parts {
      aggregator.append_bytes(part).unwrap();
    }
    let bytes = aggregator.collect_all().await.unwrap();
    assert_eq!(bytes, expected, "capacity {}", capacity);
    assert_eq!(aggregator.bytes_written(), expected.len() as u64);
  }
}

#[tokio::test]
async fn test_partial_writes_keep_order() {
  let mut aggregator = aggregator_with_capacity(8);
  aggregator.append_bytes("the quick brown ").unwrap();
  aggregator
    .append_source(ProbeSource::new("fox jumps over ").with_chunk(3))
    .unwrap();
  aggregator.append_bytes("the lazy dog").unwrap();

  let sink = aggregator
    .drive_into(MemorySink::new().with_max_write(5))
    .await
    .unwrap();

  assert_eq!(sink.data(), b"the quick brown fox jumps over the lazy dog");
  assert!(sink.is_shutdown());
  assert_eq!(aggregator.bytes_written(), 43);
}

#[tokio::test]
async fn test_empty_aggregate() {
  let mut aggregator = StreamAggregator::new();
  aggregator.append_bytes("").unwrap();
  assert_eq!(aggregator.content_length(), ContentLength::Known(0));

  let bytes = aggregator.collect_all().await.unwrap();

  assert!(bytes.is_empty());
  assert_eq!(aggregator.state(), State::Closed);
  assert!(aggregator.error().is_none());
}

#[tokio::test]
async fn test_unknown_length_poisons_total() {
  let mut aggregator = StreamAggregator::new();
  aggregator.append_bytes("known").unwrap();
  aggregator.append_reader(&b" and unknown"[..], ContentLength::Unknown).unwrap();
  aggregator.append_bytes(" again").unwrap();
  assert_eq!(aggregator.content_length(), ContentLength::Unknown);

  let bytes = aggregator.collect_all().await.unwrap();
  assert_eq!(bytes, b"known and unknown again");
  assert_eq!(aggregator.content_length(), ContentLength::Unknown);
}

#[tokio::test]
async fn test_length_mismatch_is_not_an_error() {
  let mut aggregator = StreamAggregator::new();
  aggregator.append_reader(&b"abcdef"[..], 10u64).unwrap();
  assert_eq!(aggregator.content_length(), ContentLength::Known(10));

  let bytes = aggregator.collect_all().await.unwrap();

  assert_eq!(bytes, b"abcdef");
  assert_eq!(aggregator.bytes_written(), 6);
  assert!(aggregator.error().is_none());
}

#[tokio::test]
async fn test_second_open_is_rejected_after_completion() {
  let mut aggregator = StreamAggregator::new();
  aggregator.append_bytes("once").unwrap();
  aggregator.collect_all().await.unwrap();

  assert!(matches!(
    aggregator.collect_all().await,
    Err(AggregatorError::Closed)
  ));
  assert!(matches!(
    aggregator.append_bytes("late"),
    Err(AggregatorError::Closed)
  ));
  assert_eq!(aggregator.bytes_written(), 4);
}

#[tokio::test]
async fn test_second_open_is_rejected_while_open() {
  let mut aggregator = StreamAggregator::new();
  aggregator.append_bytes("payload").unwrap();

  let stream = aggregator.open_readable().unwrap();
  assert_eq!(aggregator.state(), State::Open);

  assert!(matches!(
    aggregator.open_readable(),
    Err(AggregatorError::AlreadyOpened)
  ));
  assert!(matches!(
    aggregator.drive_into(MemorySink::new()).await,
    Err(AggregatorError::AlreadyOpened)
  ));
  assert!(matches!(
    aggregator.append_bytes("more"),
    Err(AggregatorError::AlreadyOpened)
  ));

  aggregator.close();
  tokio::time::timeout(Duration::from_secs(5), aggregator.closed())
    .await
    .unwrap();
  drop(stream);
  assert_eq!(aggregator.state(), State::Closed);
  assert!(aggregator.error().is_none());
}

#[tokio::test]
async fn test_source_failure_stops_the_aggregate() {
  let later = ProbeSource::new("never delivered");
  let later_probe = later.probe();

  let mut aggregator = aggregator_with_capacity(16);
  aggregator.append_bytes("abc").unwrap();
  aggregator
    .append_source(ProbeSource::new("xyz").failing_after(2))
    .unwrap();
  aggregator.append_source(later).unwrap();

  let err = aggregator.collect_all().await.unwrap_err();

  assert!(matches!(err, AggregatorError::SourceRead(_)));
  assert!(matches!(
    aggregator.error(),
    Some(AggregatorError::SourceRead(_))
  ));
  assert_eq!(aggregator.bytes_written(), 5);
  assert_eq!(later_probe.opened(), 0);
  assert_eq!(aggregator.state(), State::Closed);
}

#[tokio::test]
async fn test_source_open_failure_is_reported() {
  let mut aggregator = StreamAggregator::new();
  aggregator.append_bytes("head").unwrap();
  aggregator
    .append_source(ProbeSource::new("body").failing_open())
    .unwrap();

  let err = aggregator.collect_all().await.unwrap_err();

  assert!(matches!(err, AggregatorError::SourceOpen { .. }));
  assert_eq!(aggregator.bytes_written(), 4);
}

#[tokio::test]
async fn test_sink_failure_is_sticky() {
  let mut aggregator = aggregator_with_capacity(4);
  aggregator.append_bytes("0123456789").unwrap();

  let err = aggregator.drive_into(FailingSink::after(4)).await.unwrap_err();

  assert!(matches!(err, AggregatorError::SinkWrite(_)));
  assert_eq!(err.io_kind(), Some(std::io::ErrorKind::ConnectionReset));
  assert!(matches!(
    aggregator.error(),
    Some(AggregatorError::SinkWrite(_))
  ));
  assert_eq!(aggregator.bytes_written(), 4);
  assert_eq!(aggregator.state(), State::Closed);
}

#[tokio::test]
async fn test_append_missing_file() {
  let dir = tempfile::tempdir().unwrap();
  let mut aggregator = StreamAggregator::new();
  aggregator.append_bytes("x").unwrap();

  let err = aggregator
    .append_file(dir.path().join("missing.bin"))
    .await
    .unwrap_err();

  assert!(matches!(err, AggregatorError::SourceOpen { .. }));
  assert_eq!(aggregator.content_length(), ContentLength::Known(1));
  assert_eq!(aggregator.state(), State::Unopened);
}

#[tokio::test]
async fn test_file_between_memory_sources() {
  let mut file = tempfile::NamedTempFile::new().unwrap();
  let body = pattern(1000, 7);
  file.write_all(&body).unwrap();
  file.flush().unwrap();

  let mut aggregator = aggregator_with_capacity(64);
  aggregator.append_bytes("--b\r\n").unwrap();
  aggregator.append_file(file.path()).await.unwrap();
  aggregator.append_bytes("\r\n--b--\r\n").unwrap();
  assert_eq!(aggregator.content_length(), ContentLength::Known(1014));

  let bytes = aggregator.collect_all().await.unwrap();

  assert_eq!(bytes.len(), 1014);
  assert_eq!(&bytes[..5], b"--b\r\n");
  assert_eq!(&bytes[5..1005], &body[..]);
  assert_eq!(&bytes[1005..], b"\r\n--b--\r\n");
}

#[tokio::test]
async fn test_readable_mode_small_reads() {
  let expected = [pattern(70, 1), pattern(100, 2)].concat();
  let mut aggregator = aggregator_with_capacity(16);
  aggregator.append_bytes(expected[..70].to_vec()).unwrap();
  aggregator.append_bytes(expected[70..].to_vec()).unwrap();

  let mut stream = aggregator.open_readable().unwrap();
  let mut received = Vec::new();
  let mut buf = [0u8; 10];
  loop {
    let n = stream.read(&mut buf).await.unwrap();
    if n == 0 {
      break;
    }
    received.extend_from_slice(&buf[..n]);
  }

  tokio::time::timeout(Duration::from_secs(5), aggregator.closed())
    .await
    .unwrap();
  assert_eq!(received, expected);
  assert_eq!(aggregator.bytes_written(), 170);
  assert!(aggregator.error().is_none());
}

#[tokio::test]
async fn test_readable_mode_with_no_sources() {
  let mut aggregator = StreamAggregator::new();
  let mut stream = aggregator.open_readable().unwrap();

  let mut received = Vec::new();
  stream.read_to_end(&mut received).await.unwrap();

  assert!(received.is_empty());
  tokio::time::timeout(Duration::from_secs(5), aggregator.closed())
    .await
    .unwrap();
  assert!(aggregator.error().is_none());
}

#[tokio::test]
async fn test_dropping_the_readable_closes_without_error() {
  let total = 64 * 1024;
  let mut aggregator = StreamAggregator::with_config(
    AggregatorConfig::default()
      .with_capacity(16)
      .with_pipe_capacity(16),
  );
  aggregator.append_bytes(pattern(total, 3)).unwrap();

  let mut stream = aggregator.open_readable().unwrap();
  let mut head = [0u8; 10];
  stream.read_exact(&mut head).await.unwrap();
  assert_eq!(head.to_vec(), pattern(10, 3));
  drop(stream);

  tokio::time::timeout(Duration::from_secs(5), aggregator.closed())
    .await
    .unwrap();
  assert_eq!(aggregator.state(), State::Closed);
  assert!(aggregator.error().is_none());
  assert!(aggregator.bytes_written() < total as u64);
}

#[tokio::test]
async fn test_close_while_waiting_on_a_source() {
  let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(1);
  let (writer, mut reader) = tokio::io::duplex(64);
  let mut aggregator = StreamAggregator::new();
  aggregator.append_bytes("prefix").unwrap();
  aggregator.append_channel(rx).unwrap();

  aggregator.open_into(writer).unwrap();
  let mut head = [0u8; 6];
  tokio::time::timeout(Duration::from_secs(2), reader.read_exact(&mut head))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(&head, b"prefix");
  assert_eq!(aggregator.bytes_written(), 6);

  aggregator.close();
  tokio::time::timeout(Duration::from_secs(5), aggregator.closed())
    .await
    .unwrap();
  assert_eq!(aggregator.state(), State::Closed);
  assert!(aggregator.error().is_none());

  let mut rest = Vec::new();
  reader.read_to_end(&mut rest).await.unwrap();
  assert!(rest.is_empty());
  drop(tx);
}

#[tokio::test]
async fn test_readable_delivers_buffered_bytes_while_next_source_is_idle() {
  let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(1);
  let mut aggregator = StreamAggregator::new();
  aggregator.append_bytes("prefix").unwrap();
  aggregator.append_channel(rx).unwrap();

  let mut stream = aggregator.open_readable().unwrap();
  let mut head = [0u8; 6];
  tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut head))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(&head, b"prefix");

  tx.send(Bytes::from_static(b" and the rest")).await.unwrap();
  drop(tx);
  let mut rest = Vec::new();
  tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(rest, b" and the rest");

  tokio::time::timeout(Duration::from_secs(5), aggregator.closed())
    .await
    .unwrap();
  assert_eq!(aggregator.bytes_written(), 19);
  assert!(aggregator.error().is_none());
}

#[tokio::test]
async fn test_close_before_open_is_idempotent() {
  let probe_source = ProbeSource::new("unused");
  let probe = probe_source.probe();
  let mut aggregator = StreamAggregator::new();
  aggregator.append_source(probe_source).unwrap();

  aggregator.close();
  assert_eq!(aggregator.state(), State::Closed);
  aggregator.close();
  assert_eq!(aggregator.state(), State::Closed);

  assert_eq!(probe.opened(), 0);
  assert!(aggregator.is_finished());
  assert!(matches!(
    aggregator.append_bytes("late"),
    Err(AggregatorError::Closed)
  ));
  assert!(matches!(
    aggregator.open_into(MemorySink::new()),
    Err(AggregatorError::Closed)
  ));
  tokio::time::timeout(Duration::from_secs(5), aggregator.closed())
    .await
    .unwrap();
}

#[tokio::test]
async fn test_open_into_duplex_writer() {
  let (writer, mut reader) = tokio::io::duplex(8);
  let mut aggregator = aggregator_with_capacity(32);
  aggregator.append_bytes(pattern(50, 9)).unwrap();
  aggregator.append_bytes(pattern(25, 99)).unwrap();

  aggregator.open_into(writer).unwrap();
  let mut received = Vec::new();
  reader.read_to_end(&mut received).await.unwrap();

  tokio::time::timeout(Duration::from_secs(5), aggregator.closed())
    .await
    .unwrap();
  assert_eq!(received, [pattern(50, 9), pattern(25, 99)].concat());
  assert_eq!(aggregator.bytes_written(), 75);
}

#[tokio::test]
async fn test_byte_stream_chunks_respect_capacity() {
  let mut aggregator = aggregator_with_capacity(12);
  aggregator.append_bytes(pattern(100, 5)).unwrap();

  let chunks: Vec<Bytes> = aggregator
    .open_byte_stream()
    .unwrap()
    .map(|chunk| chunk.unwrap())
    .collect()
    .await;

  assert!(chunks.iter().all(|chunk| !chunk.is_empty() && chunk.len() <= 12));
  assert_eq!(chunks.concat(), pattern(100, 5));
}

#[tokio::test]
async fn test_channel_source_in_the_middle() {
  let (tx, rx) = tokio::sync::mpsc::channel(2);
  let mut aggregator = aggregator_with_capacity(4);
  aggregator.append_bytes("<").unwrap();
  aggregator.append_channel(rx).unwrap();
  aggregator.append_bytes(">").unwrap();
  assert!(aggregator.content_length().is_unknown());

  let producer = tokio::spawn(async move {
    for chunk in ["al", "pha", "bet"] {
      tx.send(Bytes::from(chunk)).await.unwrap();
    }
  });

  let bytes = aggregator.collect_all().await.unwrap();
  producer.await.unwrap();
  assert_eq!(bytes, b"<alphabet>");
}

#[tokio::test]
async fn test_stream_source() {
  let chunks = vec![
    Ok(Bytes::from_static(b"chunk one, ")),
    Ok(Bytes::from_static(b"chunk two")),
  ];
  let mut aggregator = aggregator_with_capacity(5);
  aggregator.append_stream(futures::stream::iter(chunks)).unwrap();

  let bytes = aggregator.collect_all().await.unwrap();
  assert_eq!(bytes, b"chunk one, chunk two");
}

#[test]
fn test_detached_modes_need_a_runtime() {
  let mut aggregator = StreamAggregator::new();
  aggregator.append_bytes("data").unwrap();

  assert!(matches!(
    aggregator.open_readable(),
    Err(AggregatorError::NoRuntime)
  ));
  assert!(matches!(
    aggregator.open_into(MemorySink::new()),
    Err(AggregatorError::NoRuntime)
  ));
  assert_eq!(aggregator.state(), State::Unopened);
  assert_eq!(aggregator.content_length(), ContentLength::Known(4));
}

#[test]
fn test_debug_output() {
  let aggregator = StreamAggregator::with_config(
    AggregatorConfig::default().with_name("upload".to_string()),
  );
  let debug = format!("{:?}", aggregator);
  assert!(debug.contains("upload"));
  assert!(debug.contains("Unopened"));
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn prop_aggregate_is_the_concatenation(
    chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..8),
    capacity in 1usize..48,
    max_write in 1usize..48,
    read_chunk in 1usize..16,
  ) {
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();
    let expected = chunks.concat();

    let (written, data) = runtime.block_on(async {
      let mut aggregator = aggregator_with_capacity(capacity);
      for chunk in &chunks {
        aggregator
          .append_source(ProbeSource::new(chunk.clone()).with_chunk(read_chunk))
          .unwrap();
      }
      let sink = aggregator
        .drive_into(MemorySink::new().with_max_write(max_write))
        .await
        .unwrap();
      (aggregator.bytes_written(), sink.into_inner())
    });

    prop_assert_eq!(written, expected.len() as u64);
    prop_assert_eq!(data, expected);
  }
}
