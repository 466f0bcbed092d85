//! Error types for the heap and its configuration.

use core::fmt;

/// Errors surfaced by [`Heap::allocate`](crate::Heap::allocate) when the heap
/// runs with [`FailurePolicy::Error`](crate::FailurePolicy::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// The page source could not map `len` bytes.
  MapFailed { len: usize },
  /// Rounding `size` up to whole pages overflows the address space.
  SizeOverflow { size: usize },
}

impl AllocError {
  /// Static message for the fatal path, where formatting is off limits.
  pub(crate) const fn fatal_message(&self) -> &'static str {
    match self {
      Self::MapFailed { .. } => "pageslab: mmap failed! Giving up.\n",
      Self::SizeOverflow { .. } => "pageslab: allocation size overflows the address space! Giving up.\n",
    }
  }
}

impl fmt::Display for AllocError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MapFailed { len } => write!(f, "failed to map {len} bytes of anonymous memory"),
      Self::SizeOverflow { size } => write!(f, "allocation of {size} bytes overflows page rounding"),
    }
  }
}

impl std::error::Error for AllocError {}

/// Rejected size-class ladders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
  /// The ladder has no classes.
  NoClasses,
  /// More classes than the free-list table can hold.
  TooManyClasses { count: usize },
  /// A class is zero or not a multiple of the chunk alignment.
  Misaligned { size: usize },
  /// A class leaves no room for a chunk after the slab header.
  TooLarge { size: usize },
  /// Classes must be strictly ascending.
  NotAscending { size: usize },
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NoClasses => write!(f, "size-class ladder is empty"),
      Self::TooManyClasses { count } => write!(f, "{count} size classes exceed the free-list table"),
      Self::Misaligned { size } => write!(f, "size class {size} is not a non-zero multiple of 16"),
      Self::TooLarge { size } => write!(f, "size class {size} does not fit twice in a page"),
      Self::NotAscending { size } => write!(f, "size class {size} breaks ascending order"),
    }
  }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fatal_messages_are_newline_terminated() {
    for err in [AllocError::MapFailed { len: 4096 }, AllocError::SizeOverflow { size: usize::MAX }] {
      assert!(err.fatal_message().ends_with('\n'));
    }
  }

  #[test]
  fn display_carries_the_offending_value() {
    assert_eq!(
      AllocError::MapFailed { len: 8192 }.to_string(),
      "failed to map 8192 bytes of anonymous memory"
    );
    assert_eq!(
      ConfigError::NotAscending { size: 32 }.to_string(),
      "size class 32 breaks ascending order"
    );
  }
}
