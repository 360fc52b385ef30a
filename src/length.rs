//! Declared content lengths.

use std::fmt;
use std::ops::{Add, AddAssign};

/// The declared length of a source or of the whole aggregate.
///
/// Sums of lengths are `Unknown` as soon as one operand is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentLength {
  /// The length in bytes is known up front.
  Known(u64),
  /// The length cannot be determined until the source is exhausted.
  Unknown,
}

impl ContentLength {
  /// A known length of zero.
  pub const ZERO: ContentLength = ContentLength::Known(0);

  /// Returns the length in bytes, if known.
  pub fn known(self) -> Option<u64> {
    match self {
      ContentLength::Known(n) => Some(n),
      ContentLength::Unknown => None,
    }
  }

  /// Returns `true` for [`ContentLength::Unknown`].
  pub fn is_unknown(self) -> bool {
    matches!(self, ContentLength::Unknown)
  }
}

impl Default for ContentLength {
  fn default() -> Self {
    ContentLength::ZERO
  }
}

impl From<u64> for ContentLength {
  fn from(n: u64) -> Self {
    ContentLength::Known(n)
  }
}

impl From<Option<u64>> for ContentLength {
  fn from(n: Option<u64>) -> Self {
    n.map_or(ContentLength::Unknown, ContentLength::Known)
  }
}

impl Add for ContentLength {
  type Output = ContentLength;

  fn add(self, rhs: ContentLength) -> ContentLength {
    match (self, rhs) {
      (ContentLength::Known(a), ContentLength::Known(b)) => ContentLength::Known(a.saturating_add(b)),
      _ => ContentLength::Unknown,
    }
  }
}

impl AddAssign for ContentLength {
  fn add_assign(&mut self, rhs: ContentLength) {
    *self = *self + rhs;
  }
}

impl fmt::Display for ContentLength {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ContentLength::Known(n) => write!(f, "{}", n),
      ContentLength::Unknown => write!(f, "unknown"),
    }
  }
}
