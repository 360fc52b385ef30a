use super::ByteSource;
use crate::error::AggregatorError;
use crate::length::ContentLength;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{error, trace};

/// A source that reads the raw bytes of a file.
///
/// The file is stat'ed and test-opened when the source is created, so a
/// missing or unreadable path is reported at registration rather than
/// mid-stream. The handle is not kept: the file is reopened when the source
/// becomes current, so registering many files holds no descriptors. The
/// declared length is the file size at registration.
#[derive(Debug)]
pub struct FileSource {
  /// The path to the file to read from.
  path: PathBuf,
  /// File size resolved at registration.
  size: u64,
  /// The open handle; `None` until opened and after close.
  file: Option<File>,
}

impl FileSource {
  /// Resolves the size of `path` and checks that it can be opened for
  /// reading. The check handle is closed again before returning.
  ///
  /// # Errors
  ///
  /// Returns [`AggregatorError::SourceOpen`] if the path cannot be stat'ed or
  /// opened.
  pub async fn open_path(path: impl AsRef<Path>) -> Result<Self, AggregatorError> {
    let path = path.as_ref().to_path_buf();
    trace!(path = %path.display(), "FileSource::open_path()");

    let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
      error!(path = %path.display(), error = %e, "Failed to stat file");
      AggregatorError::source_open(&path, e)
    })?;
    if metadata.is_dir() {
      return Err(AggregatorError::source_open(
        &path,
        io::Error::new(io::ErrorKind::InvalidInput, "path is a directory"),
      ));
    }

    File::open(&path).await.map_err(|e| {
      error!(path = %path.display(), error = %e, "Failed to open file");
      AggregatorError::source_open(&path, e)
    })?;

    Ok(Self {
      path,
      size: metadata.len(),
      file: None,
    })
  }

  /// Returns `true` while the source holds an open file handle.
  pub fn is_open(&self) -> bool {
    self.file.is_some()
  }

  /// The path this source reads from.
  pub fn path(&self) -> &Path {
    &self.path
  }
}

#[async_trait]
impl ByteSource for FileSource {
  fn length(&self) -> ContentLength {
    ContentLength::Known(self.size)
  }

  fn label(&self) -> String {
    self.path.display().to_string()
  }

  async fn open(&mut self) -> io::Result<()> {
    if self.file.is_none() {
      trace!(path = %self.path.display(), "FileSource::open()");
      self.file = Some(File::open(&self.path).await?);
    }
    Ok(())
  }

  async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    match self.file.as_mut() {
      Some(file) => file.read(buf).await,
      None => Err(io::Error::new(io::ErrorKind::NotConnected, "file source is closed")),
    }
  }

  async fn close(&mut self) -> io::Result<()> {
    self.file.take();
    Ok(())
  }
}
