//! End-to-end behaviour of a `Heap` over real anonymous mappings.

use pageslab::{Config, Heap, LargeObjectPolicy, PAGE_SIZE, size_class};

fn usable(heap: &Heap, ptr: *mut u8) -> usize {
  unsafe { heap.usable_size(ptr) }
}

#[test]
fn allocate_release_scenario() {
  let mut heap = Heap::new();

  let a = heap.allocate(10).unwrap().as_ptr();
  assert_eq!(usable(&heap, a), 16);

  let b = heap.allocate(17).unwrap().as_ptr();
  assert_eq!(usable(&heap, b), 32);
  assert_ne!(a, b);

  unsafe { heap.release(a) };
  let c = heap.allocate(10).unwrap().as_ptr();
  assert_eq!(c, a);

  let d = heap.allocate(4096).unwrap().as_ptr();
  assert!(usable(&heap, d) >= 4096);
  assert_eq!(d as usize % PAGE_SIZE, 0);
  assert!(![a, b, c].contains(&d));
}

#[test]
fn class_boundaries() {
  let mut heap = Heap::new();
  for size in 1..=size_class::MAX_CLASS_SIZE {
    let p = heap.allocate(size).unwrap().as_ptr();
    assert_eq!(usable(&heap, p), size_class::canonical(size).unwrap(), "size {size}");
    unsafe { heap.release(p) };
  }
  // One slab per class, each reused for every size of the class.
  assert_eq!(heap.stats().slab_pages, size_class::DEFAULT_CLASS_COUNT);
}

#[test]
fn objects_hold_their_full_usable_size() {
  let mut heap = Heap::new();
  let ptrs: Vec<(*mut u8, u8)> = (0..200u8)
    .map(|i| {
      let size = 1 + (i as usize * 37) % 3000;
      let p = heap.allocate(size).unwrap().as_ptr();
      let len = usable(&heap, p).max(size);
      unsafe { p.write_bytes(i, len) };
      (p, i)
    })
    .collect();

  for &(p, fill) in &ptrs {
    let len = usable(&heap, p);
    if len > 0 {
      let bytes = unsafe { std::slice::from_raw_parts(p, len) };
      assert!(bytes.iter().all(|&x| x == fill));
    }
  }
  for (p, _) in ptrs {
    unsafe { heap.release(p) };
  }
}

#[test]
fn reference_large_object_policy() {
  let mut heap = Heap::with_config(Config::new().with_large_objects(LargeObjectPolicy::Untracked));
  let d = heap.allocate(4096).unwrap().as_ptr();
  assert_eq!(d as usize % PAGE_SIZE, 0);
  assert_eq!(usable(&heap, d), 0);
  unsafe { heap.release(d) };
  assert_eq!(heap.live_large_objects(), 0);
}

#[test]
fn mapped_memory_never_shrinks() {
  let mut heap = Heap::new();
  let mut last = 0;
  let mut live = Vec::new();
  for round in 0..50usize {
    live.push(heap.allocate(round * 97).unwrap().as_ptr());
    if round % 3 == 0 {
      for p in live.drain(..) {
        unsafe { heap.release(p) };
      }
    }
    let mapped = heap.stats().mapped_bytes;
    assert!(mapped >= last);
    last = mapped;
  }
}
