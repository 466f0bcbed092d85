//! Side table of large mappings.
//!
//! Large objects carry no in-band header: their pointer is the mapping base,
//! so masking would land on caller data. The table records each mapping so
//! the heap can answer size queries and recycle released mappings. Nothing is
//! ever unmapped.

use core::ptr::NonNull;

pub(crate) const MAX_LARGE_ENTRIES: usize = 256;

#[derive(Clone, Copy, Debug)]
struct LargeEntry {
  /// Mapping base.
  base: usize,
  /// Mapped length, a multiple of the page size.
  len: usize,
  /// Handed out and not yet released.
  live: bool,
}

impl LargeEntry {
  const EMPTY: Self = Self {
    base: 0,
    len: 0,
    live: false,
  };

  #[inline]
  fn contains(&self, addr: usize) -> bool {
    addr >= self.base && addr - self.base < self.len
  }
}

pub(crate) struct LargeTable {
  entries: [LargeEntry; MAX_LARGE_ENTRIES],
  count: usize,
}

impl LargeTable {
  pub(crate) const fn new() -> Self {
    Self {
      entries: [LargeEntry::EMPTY; MAX_LARGE_ENTRIES],
      count: 0,
    }
  }

  #[inline]
  fn used(&self) -> &[LargeEntry] {
    &self.entries[..self.count]
  }

  /// Records a fresh live mapping. `false` when the table is full.
  pub(crate) fn insert(&mut self, base: NonNull<u8>, len: usize) -> bool {
    if self.count == MAX_LARGE_ENTRIES {
      return false;
    }
    self.entries[self.count] = LargeEntry {
      base: base.as_ptr() as usize,
      len,
      live: true,
    };
    self.count += 1;
    true
  }

  /// Length of the live mapping containing `addr`.
  pub(crate) fn lookup(&self, addr: usize) -> Option<usize> {
    self
      .used()
      .iter()
      .find(|entry| entry.live && entry.contains(addr))
      .map(|entry| entry.len)
  }

  /// Marks the live mapping containing `addr` as free.
  pub(crate) fn release(&mut self, addr: usize) -> bool {
    let count = self.count;
    match self.entries[..count]
      .iter_mut()
      .find(|entry| entry.live && entry.contains(addr))
    {
      Some(entry) => {
        entry.live = false;
        true
      }
      None => false,
    }
  }

  /// Revives the smallest released mapping of at least `len` bytes.
  pub(crate) fn reuse(&mut self, len: usize) -> Option<(NonNull<u8>, usize)> {
    let count = self.count;
    let entry = self.entries[..count]
      .iter_mut()
      .filter(|entry| !entry.live && entry.len >= len)
      .min_by_key(|entry| entry.len)?;
    entry.live = true;
    NonNull::new(entry.base as *mut u8).map(|base| (base, entry.len))
  }

  pub(crate) fn live(&self) -> usize {
    self.used().iter().filter(|entry| entry.live).count()
  }
}
