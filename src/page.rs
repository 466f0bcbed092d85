//! Page acquisition.

use core::ptr::{NonNull, null_mut};

use crate::error::AllocError;

/// OS page size assumed by the slab layout.
pub const PAGE_SIZE: usize = 0x1000;
pub const PAGE_MASK: usize = !(PAGE_SIZE - 1);

const _: () = assert!(PAGE_SIZE.is_power_of_two());

/// Source of fresh pages for a [`Heap`](crate::Heap).
///
/// Implementations hand out `len` bytes (a multiple of [`PAGE_SIZE`]) of
/// zero-initialized, readable and writable memory starting on a page
/// boundary. The heap never gives pages back.
pub trait PageSource {
  fn map(&mut self, len: usize) -> Result<NonNull<u8>, AllocError>;
}

/// Anonymous private mappings straight from the kernel.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsPages;

impl PageSource for OsPages {
  fn map(&mut self, len: usize) -> Result<NonNull<u8>, AllocError> {
    NonNull::new(unsafe { os_mmap(len) }).ok_or(AllocError::MapFailed { len })
  }
}

unsafe fn os_mmap(size: usize) -> *mut u8 {
  let ptr = unsafe {
    libc::mmap(
      null_mut(),
      size,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if ptr == libc::MAP_FAILED {
    null_mut()
  } else {
    ptr as *mut u8
  }
}

/// Start of the page containing `addr`.
#[inline(always)]
pub const fn page_base(addr: usize) -> usize {
  addr & PAGE_MASK
}

#[inline(always)]
pub const fn is_page_aligned(addr: usize) -> bool {
  addr & !PAGE_MASK == 0
}

/// Rounds `size` up to whole pages, `None` on overflow.
#[inline(always)]
pub const fn round_to_pages(size: usize) -> Option<usize> {
  match size.checked_add(PAGE_SIZE - 1) {
    Some(v) => Some(v & PAGE_MASK),
    None => None,
  }
}
