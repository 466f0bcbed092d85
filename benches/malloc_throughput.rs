use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pageslab::Heap;
use std::hint::black_box;

const OPS: u64 = 100_000;

/// Lock-free path: a private `Heap` value.
fn heap_allocate_release(heap: &mut Heap, size: usize) {
  for _ in 0..OPS {
    let ptr = heap.allocate(size).unwrap();
    black_box(ptr);
    unsafe { heap.release(ptr.as_ptr()) };
  }
}

/// Process-wide heap behind the spin lock.
fn pageslab_malloc_free(size: usize) {
  for _ in 0..OPS {
    unsafe {
      let ptr = pageslab::pageslab_malloc(size);
      black_box(ptr);
      pageslab::pageslab_free(ptr);
    }
  }
}

/// libc alloc/free throughput.
fn libc_malloc_free(size: usize) {
  for _ in 0..OPS {
    unsafe {
      let ptr = libc::malloc(size);
      black_box(ptr);
      libc::free(ptr);
    }
  }
}

fn benchmark_malloc_throughput(c: &mut Criterion) {
  let mut group = c.benchmark_group("malloc_throughput");

  for size in [16, 64, 256, 1024, 4096] {
    group.throughput(Throughput::Elements(OPS));

    let mut heap = Heap::new();
    group.bench_with_input(BenchmarkId::new("heap", size), &size, |b, &size| {
      b.iter(|| heap_allocate_release(&mut heap, size))
    });

    group.bench_with_input(BenchmarkId::new("pageslab", size), &size, |b, &size| {
      b.iter(|| pageslab_malloc_free(size))
    });

    group.bench_with_input(BenchmarkId::new("libc", size), &size, |b, &size| {
      b.iter(|| libc_malloc_free(size))
    });
  }

  group.finish();
}

criterion_group!(benches, benchmark_malloc_throughput);
criterion_main!(benches);
