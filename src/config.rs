//! Heap configuration.

use crate::size_class::SizeClasses;

/// What the heap does when the page source fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
  /// Log and exit the process with status 2.
  #[default]
  Abort,
  /// Hand the [`AllocError`](crate::AllocError) back to the caller.
  Error,
}

/// Metadata kept for allocations above the largest size class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LargeObjectPolicy {
  /// Record mappings in a side table: usable size is the mapping length and
  /// released mappings are reused by later large requests.
  #[default]
  Track,
  /// Keep nothing: usable size is 0 and release leaks the mapping.
  Untracked,
}

/// How release treats a chunk that is already free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DoubleFreePolicy {
  /// Push it again. The free list is corrupted; the caller broke the contract.
  #[default]
  Ignore,
  /// Scan the class free list first and drop the duplicate with a diagnostic.
  Detect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
  pub classes: SizeClasses,
  pub on_exhaustion: FailurePolicy,
  pub large_objects: LargeObjectPolicy,
  pub double_free: DoubleFreePolicy,
}

impl Config {
  pub const DEFAULT: Self = Self {
    classes: SizeClasses::DEFAULT,
    on_exhaustion: FailurePolicy::Abort,
    large_objects: LargeObjectPolicy::Track,
    double_free: DoubleFreePolicy::Ignore,
  };

  pub const fn new() -> Self {
    Self::DEFAULT
  }

  /// Configuration of the process-wide heap, selected by Cargo features.
  pub const fn from_features() -> Self {
    let mut config = Self::DEFAULT;
    if cfg!(feature = "detect-double-free") {
      config.double_free = DoubleFreePolicy::Detect;
    }
    if cfg!(feature = "untracked-large") {
      config.large_objects = LargeObjectPolicy::Untracked;
    }
    config
  }

  pub const fn with_classes(mut self, classes: SizeClasses) -> Self {
    self.classes = classes;
    self
  }

  pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
    self.on_exhaustion = policy;
    self
  }

  pub const fn with_large_objects(mut self, policy: LargeObjectPolicy) -> Self {
    self.large_objects = policy;
    self
  }

  pub const fn with_double_free(mut self, policy: DoubleFreePolicy) -> Self {
    self.double_free = policy;
    self
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::DEFAULT
  }
}
