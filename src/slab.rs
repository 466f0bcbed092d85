//! Slab layout.
//!
//! A small-object page is split into `PAGE_SIZE / class` slots of one class.
//! Slot 0 holds the [`SlabHeader`]; the remaining slots are chunks. Because
//! the header sits in a whole slot, every chunk starts at an offset that is a
//! multiple of its class size, so both the header and the chunk start can be
//! recovered from any interior pointer by masking.

use core::{
  mem::size_of,
  ptr::{NonNull, null_mut},
};

use crate::{
  page::{PAGE_SIZE, page_base},
  size_class::MIN_CLASS_SIZE,
};

/// Marks a page formatted by this allocator.
pub(crate) const SLAB_MAGIC: u32 = 123_456;

#[repr(C)]
struct SlabHeader {
  magic: u32,
  class_size: usize,
}

/// A free chunk. Its first word links to the next free chunk of the class.
#[repr(C)]
pub(crate) struct FreeChunk {
  pub(crate) next: *mut FreeChunk,
}

const _: () = assert!(size_of::<SlabHeader>() <= MIN_CLASS_SIZE);
const _: () = assert!(size_of::<FreeChunk>() <= MIN_CLASS_SIZE);

/// Writes the header into `page` and threads its chunks in address order.
/// Returns the first chunk; its `next` is the rest of the slab.
///
/// # Safety
/// `page` must be a writable, page-aligned, exclusively owned page and
/// `class_size` at most `PAGE_SIZE / 2`.
pub(crate) unsafe fn format_slab(page: NonNull<u8>, class_size: usize) -> NonNull<FreeChunk> {
  debug_assert!((MIN_CLASS_SIZE..=PAGE_SIZE / 2).contains(&class_size));

  unsafe {
    page.cast::<SlabHeader>().write(SlabHeader {
      magic: SLAB_MAGIC,
      class_size,
    });
  }

  let mut next: *mut FreeChunk = null_mut();
  for slot in (1..PAGE_SIZE / class_size).rev() {
    let chunk = unsafe { page.add(slot * class_size).cast::<FreeChunk>() };
    unsafe { chunk.write(FreeChunk { next }) };
    next = chunk.as_ptr();
  }

  unsafe { page.add(class_size).cast() }
}

/// Class size recorded in the header of the page containing `addr`.
///
/// # Safety
/// The page containing `addr` must be mapped and readable.
pub(crate) unsafe fn header_class(addr: usize) -> Option<usize> {
  let header = page_base(addr) as *const SlabHeader;
  let header = unsafe { &*header };
  (header.magic == SLAB_MAGIC).then_some(header.class_size)
}

/// Start of the chunk containing `addr`, or `None` for the header slot and
/// the slack past the last chunk.
#[inline]
pub(crate) fn chunk_start(addr: usize, class_size: usize) -> Option<usize> {
  let base = page_base(addr);
  let slot = (addr - base) / class_size;
  if slot == 0 || (slot + 1) * class_size > PAGE_SIZE {
    return None;
  }
  Some(base + slot * class_size)
}

/// Chunks a slab of `class_size` hands out.
#[inline]
pub const fn chunks_per_slab(class_size: usize) -> usize {
  PAGE_SIZE / class_size - 1
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::page::{OsPages, PageSource};

  fn chain_len(mut chunk: *mut FreeChunk) -> usize {
    let mut len = 0;
    while !chunk.is_null() {
      len += 1;
      chunk = unsafe { (*chunk).next };
    }
    len
  }

  #[test]
  fn chunks_follow_the_header_slot_in_address_order() {
    for class_size in [16, 48, 256, 2048] {
      let page = OsPages.map(PAGE_SIZE).unwrap();
      let first = unsafe { format_slab(page, class_size) };
      let base = page.as_ptr() as usize;

      assert_eq!(first.as_ptr() as usize, base + class_size);
      assert_eq!(chain_len(first.as_ptr()), chunks_per_slab(class_size));

      let mut expected = base + class_size;
      let mut chunk = first.as_ptr();
      while !chunk.is_null() {
        assert_eq!(chunk as usize, expected);
        assert!(chunk as usize + class_size <= base + PAGE_SIZE);
        expected += class_size;
        chunk = unsafe { (*chunk).next };
      }
    }
  }

  #[test]
  fn header_is_readable_from_any_interior_address() {
    let page = OsPages.map(PAGE_SIZE).unwrap();
    unsafe { format_slab(page, 64) };
    let base = page.as_ptr() as usize;

    for offset in [0, 8, 64, 100, PAGE_SIZE - 1] {
      assert_eq!(unsafe { header_class(base + offset) }, Some(64));
    }
  }

  #[test]
  fn blank_page_has_no_header() {
    let page = OsPages.map(PAGE_SIZE).unwrap();
    assert_eq!(unsafe { header_class(page.as_ptr() as usize + 32) }, None);
  }

  #[test]
  fn chunk_start_masks_within_the_page() {
    let base = 0x10_0000;
    assert_eq!(chunk_start(base + 32, 32), Some(base + 32));
    assert_eq!(chunk_start(base + 63, 32), Some(base + 32));
    assert_eq!(chunk_start(base + 100, 48), Some(base + 96));
    // Header slot.
    assert_eq!(chunk_start(base + 8, 32), None);
    // 4096 = 85 * 48 + 16: the tail is not a chunk.
    assert_eq!(chunk_start(base + 85 * 48 + 4, 48), None);
  }

  #[test]
  fn chunk_counts() {
    assert_eq!(chunks_per_slab(16), 255);
    assert_eq!(chunks_per_slab(48), 84);
    assert_eq!(chunks_per_slab(2048), 1);
  }
}
