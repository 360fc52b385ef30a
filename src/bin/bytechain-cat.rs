//! Concatenates files (or `-` for stdin) to stdout through a
//! [`StreamAggregator`].

use bytechain::{AggregatorConfig, ContentLength, StreamAggregator};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[clap(name = "bytechain-cat")]
#[clap(about = "Concatenate files and stdin to stdout", long_about = None)]
struct Cli {
  /// Staging buffer capacity in bytes.
  #[clap(long)]
  capacity: Option<usize>,

  /// Inputs in output order. `-` reads stdin. Defaults to stdin.
  inputs: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
  // Log records go to stderr; stdout carries the aggregate.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let args = Cli::parse();

  let mut config = AggregatorConfig::default().with_name("bytechain-cat".to_string());
  if let Some(capacity) = args.capacity {
    config = config.with_capacity(capacity);
  }
  let inputs = if args.inputs.is_empty() {
    vec!["-".to_string()]
  } else {
    args.inputs
  };

  let mut aggregator = StreamAggregator::with_config(config);
  for input in &inputs {
    let appended = if input == "-" {
      aggregator.append_reader(tokio::io::stdin(), ContentLength::Unknown)
    } else {
      aggregator.append_file(input).await
    };
    if let Err(e) = appended {
      error!(input = %input, error = %e, "Failed to append input");
      return ExitCode::FAILURE;
    }
  }
  info!(
    inputs = inputs.len(),
    content_length = %aggregator.content_length(),
    "aggregating"
  );

  match aggregator.drive_into(tokio::io::stdout()).await {
    Ok(_) => {
      info!(bytes_written = aggregator.bytes_written(), "done");
      ExitCode::SUCCESS
    }
    Err(e) => {
      error!(error = %e, bytes_written = aggregator.bytes_written(), "aggregation failed");
      ExitCode::FAILURE
    }
  }
}
