//! The allocation engine.
//!
//! A [`Heap`] owns one LIFO free list per size class, the large-object side
//! table and its page source. Small requests pop a chunk from their class
//! list, formatting a fresh slab page when the list is empty. Large requests
//! get a dedicated page-rounded mapping.

use core::ptr::{NonNull, null_mut};

use log::{debug, warn};

use crate::{
  config::{Config, DoubleFreePolicy, FailurePolicy, LargeObjectPolicy},
  diag,
  error::AllocError,
  large::LargeTable,
  page::{OsPages, PAGE_SIZE, PageSource, is_page_aligned, round_to_pages},
  size_class::MAX_CLASSES,
  slab::{self, FreeChunk},
};

/// Counters over everything a heap has mapped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Pages formatted as slabs.
  pub slab_pages: usize,
  /// Dedicated mappings made for large objects.
  pub large_mappings: usize,
  /// Bytes obtained from the page source. Never decreases.
  pub mapped_bytes: usize,
}

/// Something worth logging that happened inside an allocation.
///
/// The heap records at most one event per call instead of logging in place:
/// the process-wide heap runs under a lock, and a logger that allocates must
/// not reach the allocator from there. [`HeapEvent::log`] emits it once the
/// caller is back outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapEvent {
  /// A fresh page was formatted as a slab.
  SlabFormatted { page: usize, class_size: usize },
  /// A large object got a new mapping. `table_full` when the side table had
  /// no room left to track it.
  LargeMapped {
    base: usize,
    len: usize,
    table_full: bool,
  },
  /// The page source failed under [`FailurePolicy::Error`].
  Failed(AllocError),
}

impl HeapEvent {
  pub fn log(&self) {
    match *self {
      Self::SlabFormatted { page, class_size } => {
        debug!("formatted slab {page:#x} for class {class_size}")
      }
      Self::LargeMapped {
        base,
        len,
        table_full,
      } => {
        debug!("mapped large object {base:#x} ({len} bytes)");
        if table_full {
          warn!("large object table full, mapping {base:#x} left untracked");
        }
      }
      Self::Failed(err) => warn!("{err}"),
    }
  }
}

/// A chunk located from a pointer into a slab page.
#[derive(Clone, Copy)]
struct SlabChunk {
  index: usize,
  size: usize,
  start: usize,
}

/// Segregated free-list allocator state.
///
/// A `Heap` is single-threaded; share one across threads only behind a lock.
pub struct Heap<S = OsPages> {
  config: Config,
  source: S,
  free_lists: [*mut FreeChunk; MAX_CLASSES],
  large: LargeTable,
  stats: HeapStats,
  event: Option<HeapEvent>,
}

impl Heap<OsPages> {
  /// Default configuration over anonymous OS mappings.
  pub const fn new() -> Self {
    Self::with_source(Config::DEFAULT, OsPages)
  }

  pub const fn with_config(config: Config) -> Self {
    Self::with_source(config, OsPages)
  }
}

impl Default for Heap<OsPages> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: PageSource> Heap<S> {
  pub const fn with_source(config: Config, source: S) -> Self {
    Self {
      config,
      source,
      free_lists: [null_mut(); MAX_CLASSES],
      large: LargeTable::new(),
      stats: HeapStats {
        slab_pages: 0,
        large_mappings: 0,
        mapped_bytes: 0,
      },
      event: None,
    }
  }

  #[inline]
  pub fn config(&self) -> &Config {
    &self.config
  }

  #[inline]
  pub fn stats(&self) -> HeapStats {
    self.stats
  }

  /// Large mappings currently handed out.
  pub fn live_large_objects(&self) -> usize {
    self.large.live()
  }

  /// Number of chunks on the free list of class `index`.
  pub fn free_chunks(&self, index: usize) -> usize {
    if index >= self.config.classes.len() {
      return 0;
    }
    let mut count = 0;
    let mut chunk = self.free_lists[index];
    while !chunk.is_null() {
      count += 1;
      chunk = unsafe { (*chunk).next };
    }
    count
  }

  /// Allocates at least `size` bytes.
  ///
  /// Requests up to the largest class are served from that class's slabs and
  /// are aligned to the class size within their page. Bigger requests get a
  /// page-aligned mapping of their own. With [`FailurePolicy::Abort`] this
  /// never returns `Err`.
  pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
    let result = self.allocate_quiet(size);
    if let Some(event) = self.take_event() {
      event.log();
    }
    result
  }

  /// [`allocate`](Self::allocate) without logging. The event it produced, if
  /// any, is left for [`take_event`](Self::take_event).
  pub fn allocate_quiet(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
    self.event = None;
    match self.config.classes.lookup(size) {
      Some(index) => self.allocate_small(index),
      None => self.allocate_large(size),
    }
  }

  /// Takes the event recorded by the last allocation.
  #[inline]
  pub fn take_event(&mut self) -> Option<HeapEvent> {
    self.event.take()
  }

  fn allocate_small(&mut self, index: usize) -> Result<NonNull<u8>, AllocError> {
    if let Some(chunk) = self.pop(index) {
      return Ok(chunk);
    }

    let class_size = self.config.classes.size(index);
    let page = self.map(PAGE_SIZE)?;
    self.stats.slab_pages += 1;
    self.event = Some(HeapEvent::SlabFormatted {
      page: page.as_ptr() as usize,
      class_size,
    });

    let chunk = unsafe { slab::format_slab(page, class_size) };
    self.free_lists[index] = unsafe { chunk.as_ref().next };
    Ok(chunk.cast())
  }

  fn allocate_large(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
    let Some(len) = round_to_pages(size) else {
      return self.fail(AllocError::SizeOverflow { size });
    };

    let track = self.config.large_objects == LargeObjectPolicy::Track;
    if track && let Some((base, _)) = self.large.reuse(len) {
      return Ok(base);
    }

    let base = self.map(len)?;
    self.stats.large_mappings += 1;
    let table_full = track && !self.large.insert(base, len);
    self.event = Some(HeapEvent::LargeMapped {
      base: base.as_ptr() as usize,
      len,
      table_full,
    });
    Ok(base)
  }

  #[inline]
  fn pop(&mut self, index: usize) -> Option<NonNull<u8>> {
    let head = NonNull::new(self.free_lists[index])?;
    self.free_lists[index] = unsafe { head.as_ref().next };
    Some(head.cast())
  }

  fn map(&mut self, len: usize) -> Result<NonNull<u8>, AllocError> {
    match self.source.map(len) {
      Ok(base) => {
        self.stats.mapped_bytes += len;
        Ok(base)
      }
      Err(err) => self.fail(err),
    }
  }

  fn fail<T>(&mut self, err: AllocError) -> Result<T, AllocError> {
    match self.config.on_exhaustion {
      FailurePolicy::Abort => diag::fatal(err.fatal_message()),
      FailurePolicy::Error => {
        self.event = Some(HeapEvent::Failed(err));
        Err(err)
      }
    }
  }

  /// Usable bytes of the object `ptr` points into, 0 when `ptr` is null or
  /// not recognised.
  ///
  /// Tracked large mappings are matched first, so caller data at the start
  /// of a large object's pages is never read as a slab header.
  ///
  /// # Safety
  /// `ptr` must be null, come from this heap, or point into mapped readable
  /// memory: the header of its page is read.
  pub unsafe fn usable_size(&self, ptr: *const u8) -> usize {
    if ptr.is_null() {
      return 0;
    }
    let addr = ptr as usize;

    if let Some(len) = self.large.lookup(addr) {
      return len;
    }
    if !is_page_aligned(addr)
      && let Some(chunk) = unsafe { self.slab_chunk(addr) }
    {
      return chunk.size;
    }
    0
  }

  /// Returns the object `ptr` points into to the heap. Null and unrecognised
  /// pointers are ignored.
  ///
  /// # Safety
  /// Same as [`usable_size`](Self::usable_size). The object must not be used
  /// afterwards, and must not already be free unless the heap runs with
  /// [`DoubleFreePolicy::Detect`].
  pub unsafe fn release(&mut self, ptr: *mut u8) {
    if ptr.is_null() {
      return;
    }
    let addr = ptr as usize;

    if self.large.release(addr) {
      return;
    }
    if !is_page_aligned(addr)
      && let Some(chunk) = unsafe { self.slab_chunk(addr) }
    {
      unsafe { self.push(chunk) };
    }
  }

  /// Locates the slab chunk containing `addr`. A page-aligned address is
  /// always a header slot, so callers route those to the large table.
  unsafe fn slab_chunk(&self, addr: usize) -> Option<SlabChunk> {
    let size = unsafe { slab::header_class(addr) }?;
    let index = self.config.classes.position(size)?;
    let start = slab::chunk_start(addr, size)?;
    Some(SlabChunk { index, size, start })
  }

  unsafe fn push(&mut self, chunk: SlabChunk) {
    let node = chunk.start as *mut FreeChunk;

    if self.config.double_free == DoubleFreePolicy::Detect && self.is_free(chunk.index, node) {
      diag::log_message("pageslab: double free detected, ignoring release\n");
      return;
    }

    unsafe { (*node).next = self.free_lists[chunk.index] };
    self.free_lists[chunk.index] = node;
  }

  fn is_free(&self, index: usize, node: *mut FreeChunk) -> bool {
    let mut chunk = self.free_lists[index];
    while !chunk.is_null() {
      if chunk == node {
        return true;
      }
      chunk = unsafe { (*chunk).next };
    }
    false
  }
}
