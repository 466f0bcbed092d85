//! Size classes.
//!
//! Small requests are bucketed into a ladder of chunk sizes. The default
//! ladder is the eight powers of two from 16 to 2048; [`SizeClasses`] accepts
//! any ascending ladder whose classes are multiples of [`CLASS_ALIGN`] and fit
//! at least twice in a page (one slot for the header, one for a chunk).

use crate::{error::ConfigError, page::PAGE_SIZE};

/// Smallest class, and the minimum usable size of any small allocation.
pub const MIN_CLASS_SIZE: usize = 16;
/// Largest class of the default ladder. Bigger requests get their own mapping.
pub const MAX_CLASS_SIZE: usize = 2048;
/// Number of classes in the default ladder.
pub const DEFAULT_CLASS_COUNT: usize = 8;
/// Capacity of the free-list table.
pub const MAX_CLASSES: usize = 32;
/// Every class is a multiple of this.
pub const CLASS_ALIGN: usize = 16;

const MIN_CLASS_SHIFT: usize = MIN_CLASS_SIZE.trailing_zeros() as usize;

const _: () = assert!(MIN_CLASS_SIZE.is_power_of_two());
const _: () = assert!(MAX_CLASS_SIZE.is_power_of_two());
const _: () = assert!(MAX_CLASS_SIZE <= PAGE_SIZE / 2);
const _: () = assert!(MIN_CLASS_SIZE << (DEFAULT_CLASS_COUNT - 1) == MAX_CLASS_SIZE);
const _: () = assert!(DEFAULT_CLASS_COUNT <= MAX_CLASSES);
const _: () = assert!(matches!(index(MAX_CLASS_SIZE), Some(7)));

/// Canonical class of `size`: the smallest power of two in 16..=2048 that is
/// `>= size`. `None` when the request is too big to be size-classed.
#[inline]
pub const fn canonical(size: usize) -> Option<usize> {
  if size > MAX_CLASS_SIZE {
    None
  } else if size <= MIN_CLASS_SIZE {
    Some(MIN_CLASS_SIZE)
  } else {
    Some(size.next_power_of_two())
  }
}

/// Free-list index of `size` in the default ladder: `log2(canonical) - 4`.
#[inline]
pub const fn index(size: usize) -> Option<usize> {
  match canonical(size) {
    Some(class) => Some(class.trailing_zeros() as usize - MIN_CLASS_SHIFT),
    None => None,
  }
}

/// An ascending ladder of chunk sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeClasses {
  sizes: [usize; MAX_CLASSES],
  len: usize,
}

impl SizeClasses {
  /// 16, 32, 64, ..., 2048.
  pub const DEFAULT: Self = Self::powers_of_two();

  const fn powers_of_two() -> Self {
    let mut sizes = [0; MAX_CLASSES];
    let mut i = 0;
    while i < DEFAULT_CLASS_COUNT {
      sizes[i] = MIN_CLASS_SIZE << i;
      i += 1;
    }
    Self {
      sizes,
      len: DEFAULT_CLASS_COUNT,
    }
  }

  /// Builds a custom ladder.
  pub fn new(classes: &[usize]) -> Result<Self, ConfigError> {
    if classes.is_empty() {
      return Err(ConfigError::NoClasses);
    }
    if classes.len() > MAX_CLASSES {
      return Err(ConfigError::TooManyClasses {
        count: classes.len(),
      });
    }

    let mut sizes = [0; MAX_CLASSES];
    let mut prev = 0;
    for (slot, &size) in sizes.iter_mut().zip(classes) {
      if size == 0 || !size.is_multiple_of(CLASS_ALIGN) {
        return Err(ConfigError::Misaligned { size });
      }
      if size > PAGE_SIZE / 2 {
        return Err(ConfigError::TooLarge { size });
      }
      if size <= prev {
        return Err(ConfigError::NotAscending { size });
      }
      *slot = size;
      prev = size;
    }

    Ok(Self {
      sizes,
      len: classes.len(),
    })
  }

  #[inline]
  pub const fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub const fn is_empty(&self) -> bool {
    self.len == 0
  }

  #[inline]
  pub fn as_slice(&self) -> &[usize] {
    &self.sizes[..self.len]
  }

  /// Chunk size of class `index`.
  #[inline]
  pub fn size(&self, index: usize) -> usize {
    self.as_slice()[index]
  }

  /// Largest class; anything bigger is a large object.
  #[inline]
  pub fn largest(&self) -> usize {
    self.sizes[self.len - 1]
  }

  /// Index of the smallest class that holds `size` bytes.
  #[inline]
  pub fn lookup(&self, size: usize) -> Option<usize> {
    if size > self.largest() {
      return None;
    }
    self.as_slice().iter().position(|&class| class >= size)
  }

  /// Index of the class whose chunk size is exactly `size`.
  #[inline]
  pub fn position(&self, size: usize) -> Option<usize> {
    self.as_slice().iter().position(|&class| class == size)
  }
}

impl Default for SizeClasses {
  fn default() -> Self {
    Self::DEFAULT
  }
}
