//! Fixed-capacity staging buffer between the sources and the sink.

/// A fixed-capacity byte region whose valid bytes always sit at the front.
///
/// Bytes are appended into the free tail via [`StagingBuffer::spare_mut`] and
/// [`StagingBuffer::commit`]; after a partial drain [`StagingBuffer::consume`]
/// shifts the unwritten remainder back to the front, preserving order.
#[derive(Debug)]
pub struct StagingBuffer {
  data: Box<[u8]>,
  len: usize,
}

impl StagingBuffer {
  /// Allocates a buffer of `capacity` bytes (at least 1).
  pub fn new(capacity: usize) -> Self {
    Self {
      data: vec![0u8; capacity.max(1)].into_boxed_slice(),
      len: 0,
    }
  }

  /// Total capacity in bytes. Zero after [`StagingBuffer::release`].
  pub fn capacity(&self) -> usize {
    self.data.len()
  }

  /// Number of valid, not yet drained bytes.
  pub fn len(&self) -> usize {
    self.len
  }

  /// Returns `true` if no valid bytes are held.
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Free space at the tail.
  pub fn free(&self) -> usize {
    self.capacity() - self.len
  }

  /// Returns `true` if at most half of the capacity holds valid bytes.
  pub fn is_at_most_half_full(&self) -> bool {
    self.len * 2 <= self.capacity()
  }

  /// The valid bytes, oldest first.
  pub fn filled(&self) -> &[u8] {
    &self.data[..self.len]
  }

  /// The free tail, to be written by a refill.
  pub fn spare_mut(&mut self) -> &mut [u8] {
    &mut self.data[self.len..]
  }

  /// Marks `n` bytes of the tail as valid.
  pub fn commit(&mut self, n: usize) {
    assert!(n <= self.free(), "commit past buffer capacity");
    self.len += n;
  }

  /// Drops the first `n` valid bytes and moves the rest to the front.
  pub fn consume(&mut self, n: usize) {
    assert!(n <= self.len, "consume past valid length");
    self.data.copy_within(n..self.len, 0);
    self.len -= n;
  }

  /// Frees the backing memory. The buffer is unusable afterwards.
  pub fn release(&mut self) {
    self.data = Box::default();
    self.len = 0;
  }
}
