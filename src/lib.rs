//! pageslab: a segregated free-list allocator over anonymous page mappings.
//!
//! Small requests (up to 2048 bytes by default) are rounded to a power-of-two
//! size class and served from 4 KiB slab pages. Each slab starts with a header
//! naming its class, so the size of an object is recovered from a bare
//! pointer by masking it down to its page. Freed chunks go onto a per-class
//! LIFO list. Larger requests get a dedicated page-rounded mapping. Memory is
//! never returned to the OS.
//!
//! [`Heap`] is the allocator state as a plain value. The process-wide heap
//! behind [`Allocator`] and the C entry points (feature `c_api`) is one
//! `Heap` wrapped in a spin lock.

#![allow(clippy::missing_safety_doc)]

pub mod config;
pub mod diag;
pub mod error;
pub mod heap;
mod large;
pub mod page;
pub mod size_class;
pub mod slab;

use core::{
  alloc::{GlobalAlloc, Layout},
  cell::Cell,
  hint,
  ptr::{self, NonNull, null_mut},
  sync::atomic::{AtomicBool, Ordering},
};
use std::cell::UnsafeCell;

pub use config::{Config, DoubleFreePolicy, FailurePolicy, LargeObjectPolicy};
pub use error::{AllocError, ConfigError};
pub use heap::{Heap, HeapEvent, HeapStats};
pub use page::{OsPages, PAGE_SIZE, PageSource};
pub use size_class::SizeClasses;

// =============================================================================
// Process-wide heap
// =============================================================================

struct SpinLock {
  locked: AtomicBool,
}

impl SpinLock {
  const fn new() -> Self {
    Self {
      locked: AtomicBool::new(false),
    }
  }

  #[inline]
  fn lock(&self) {
    while self
      .locked
      .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
      .is_err()
    {
      while self.locked.load(Ordering::Relaxed) {
        hint::spin_loop();
      }
    }
  }

  #[inline]
  fn unlock(&self) {
    self.locked.store(false, Ordering::Release);
  }
}

struct GlobalHeap {
  lock: SpinLock,
  heap: UnsafeCell<Heap>,
}

// The heap is only reached through `with_heap`, which holds the lock.
unsafe impl Sync for GlobalHeap {}

static HEAP: GlobalHeap = GlobalHeap {
  lock: SpinLock::new(),
  heap: UnsafeCell::new(Heap::with_config(Config::from_features())),
};

thread_local! {
  static IN_ALLOC: Cell<bool> = const { Cell::new(false) };
  static IN_LOG: Cell<bool> = const { Cell::new(false) };
}

fn with_heap<R: Default, F: FnOnce(&mut Heap) -> R>(f: F) -> R {
  // Anything that allocates from inside the heap would deadlock on the lock.
  // Nested calls get the default instead. When TLS is already torn down the
  // guard is skipped; the lock still serialises.
  let guard = IN_ALLOC.try_with(|flag| flag.replace(true));
  if let Ok(true) = guard {
    return R::default();
  }

  HEAP.lock.lock();
  let result = f(unsafe { &mut *HEAP.heap.get() });
  HEAP.lock.unlock();

  if guard.is_ok() {
    let _ = IN_ALLOC.try_with(|flag| flag.set(false));
  }
  result
}

/// Logs a heap event with the lock released, so the logger may allocate.
/// Events raised by the logger's own allocations are dropped.
fn log_event(event: HeapEvent) {
  let Ok(false) = IN_LOG.try_with(|flag| flag.replace(true)) else {
    return;
  };
  event.log();
  let _ = IN_LOG.try_with(|flag| flag.set(false));
}

/// Allocates `size` bytes from the process-wide heap. Null only when called
/// re-entrantly from inside the heap.
pub unsafe fn pageslab_malloc(size: usize) -> *mut u8 {
  let (ptr, event) = with_heap(|heap| (heap.allocate_quiet(size).ok(), heap.take_event()));
  if let Some(event) = event {
    log_event(event);
  }
  ptr.map_or(null_mut(), NonNull::as_ptr)
}

/// Returns `ptr` to the process-wide heap. Null and foreign pointers are ignored.
pub unsafe fn pageslab_free(ptr: *mut u8) {
  if ptr.is_null() {
    return;
  }
  with_heap(|heap| unsafe { heap.release(ptr) })
}

/// Usable size of `ptr`, 0 for null and foreign pointers.
pub unsafe fn pageslab_usable_size(ptr: *const u8) -> usize {
  if ptr.is_null() {
    return 0;
  }
  with_heap(|heap| unsafe { heap.usable_size(ptr) })
}

/// Snapshot of the process-wide heap counters.
pub fn pageslab_stats() -> HeapStats {
  with_heap(|heap| heap.stats())
}

// =============================================================================
// GlobalAlloc
// =============================================================================

/// `#[global_allocator]` adapter over the process-wide heap.
///
/// Alignment comes from the size classes: a power-of-two class is aligned to
/// its own size, and large objects are page-aligned. Requests are bumped to
/// their alignment; alignments above a page are refused.
pub struct Allocator;

unsafe impl GlobalAlloc for Allocator {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    if layout.align() > PAGE_SIZE {
      return null_mut();
    }
    unsafe { pageslab_malloc(layout.size().max(layout.align())) }
  }

  unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
    unsafe { pageslab_free(ptr) }
  }

  unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
    let wanted = new_size.max(layout.align());
    let usable = unsafe { pageslab_usable_size(ptr) };

    // Same class (or still inside the large mapping): nothing to move.
    let in_place = match size_class::canonical(wanted) {
      Some(class) => class == usable,
      None => wanted <= usable,
    };
    if in_place {
      return ptr;
    }

    let new_ptr =
      unsafe { self.alloc(Layout::from_size_align_unchecked(new_size, layout.align())) };

    if !new_ptr.is_null() {
      unsafe { ptr::copy_nonoverlapping(ptr, new_ptr, layout.size().min(new_size)) };
      unsafe { self.dealloc(ptr, layout) };
    }

    new_ptr
  }

  unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
    // Recycled chunks and large mappings keep their old contents.
    let ptr = unsafe { self.alloc(layout) };
    if !ptr.is_null() {
      unsafe { ptr::write_bytes(ptr, 0, layout.size()) }
    }
    ptr
  }
}

// =============================================================================
// C API (enabled with --features c_api)
// =============================================================================

#[cfg(feature = "c_api")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc(size: usize) -> *mut u8 {
  unsafe { pageslab_malloc(size) }
}

#[cfg(feature = "c_api")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(ptr: *mut u8) {
  unsafe { pageslab_free(ptr) }
}

#[cfg(feature = "c_api")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn calloc(nmemb: usize, size: usize) -> *mut u8 {
  let Some(total) = nmemb.checked_mul(size) else {
    return null_mut();
  };
  let ptr = unsafe { pageslab_malloc(total) };
  if !ptr.is_null() {
    unsafe { ptr::write_bytes(ptr, 0, total) };
  }
  ptr
}

#[cfg(feature = "c_api")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
  if ptr.is_null() {
    return unsafe { pageslab_malloc(size) };
  }

  if size == 0 {
    unsafe { pageslab_free(ptr) };
    return null_mut();
  }

  let usable = unsafe { pageslab_usable_size(ptr) };
  if usable == 0 {
    // Not ours, or an untracked large object: the old size is unknown.
    return null_mut();
  }
  if size <= usable && size_class::canonical(size).is_none_or(|class| class == usable) {
    return ptr;
  }

  let new_ptr = unsafe { pageslab_malloc(size) };
  if !new_ptr.is_null() {
    unsafe { ptr::copy_nonoverlapping(ptr, new_ptr, usable.min(size)) };
    unsafe { pageslab_free(ptr) };
  }

  new_ptr
}

#[cfg(feature = "c_api")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn posix_memalign(
  memptr: *mut *mut u8,
  alignment: usize,
  size: usize,
) -> i32 {
  if !alignment.is_power_of_two() || alignment < core::mem::size_of::<*mut u8>() {
    return libc::EINVAL;
  }
  if alignment > PAGE_SIZE {
    return libc::ENOMEM;
  }

  let ptr = unsafe { pageslab_malloc(size.max(alignment)) };
  if ptr.is_null() {
    return libc::ENOMEM;
  }

  unsafe { *memptr = ptr };
  0
}

#[cfg(feature = "c_api")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc_usable_size(ptr: *mut u8) -> usize {
  unsafe { pageslab_usable_size(ptr) }
}
