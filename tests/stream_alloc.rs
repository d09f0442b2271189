//! Decoding from a stream of unknown length must not reserve what a header
//! merely claims. Runs in its own binary so the counting allocator sees only
//! these tests.

use idlwire::{Codec, CodecOptions, StreamSource, TypeRegistry, TypeSpec};
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

struct Counting;

static LARGEST: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for Counting {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        LARGEST.fetch_max(layout.size(), Ordering::Relaxed);
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        LARGEST.fetch_max(new_size, Ordering::Relaxed);
        System.realloc(ptr, layout, new_size)
    }
}

#[global_allocator]
static GLOBAL: Counting = Counting;

const CEILING: usize = 1024 * 1024;

#[test]
fn oversized_headers_allocate_little() {
    let r = TypeRegistry::default();
    let codec = Codec::new(&r, CodecOptions::default());

    let list = [10u8, 0x00, 0xff, 0xff, 0xff];
    assert!(codec.read(&TypeSpec::list(TypeSpec::I64), &mut StreamSource::new(&list[..])).is_err());

    let string = [0x03u8, 0xff, 0xff, 0xff, b'a'];
    assert!(codec.read(&TypeSpec::String, &mut StreamSource::new(&string[..])).is_err());

    let nested = [15u8, 0x00, 0x0f, 0xff, 0xff, 11];
    let spec = TypeSpec::list(TypeSpec::list(TypeSpec::String));
    assert!(codec.read(&spec, &mut StreamSource::new(&nested[..])).is_err());

    let largest = LARGEST.load(Ordering::Relaxed);
    assert!(largest < CEILING, "largest single allocation was {} bytes", largest);
}
