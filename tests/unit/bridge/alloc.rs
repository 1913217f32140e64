use super::*;

fn setup(max_pages: u32) -> (LinearMemory, GuestAllocator) {
    (LinearMemory::new(1, max_pages).unwrap(), GuestAllocator::new())
}

#[test]
fn stack_pointer_round_trips() {
    let (_, mut a) = setup(2);
    let top = a.stack_pointer();
    let slot = a.add_to_stack_pointer(-16).unwrap();
    assert_eq!(slot, top - 16);
    assert_eq!(a.add_to_stack_pointer(16).unwrap(), top);
    assert!(a.add_to_stack_pointer(16).is_err());
    assert!(a.add_to_stack_pointer(-(STACK_TOP as i32)).is_err());
    assert_eq!(a.stack_pointer(), top);
}

#[test]
fn malloc_grows_memory_and_reuses_freed_blocks() {
    let (mut mem, mut a) = setup(4);
    let p = a.malloc(&mut mem, 100, 1).unwrap();
    assert_eq!(p, HEAP_BASE);
    assert_eq!(mem.pages(), 2);
    assert_eq!(p % 8, 0);

    let q = a.malloc(&mut mem, 40, 4).unwrap();
    assert_eq!(q, HEAP_BASE + 104);
    a.free(p, 100, 1).unwrap();

    // First fit reuses the hole left by `p`.
    let r = a.malloc(&mut mem, 24, 8).unwrap();
    assert_eq!(r, p);
    assert_eq!(a.stats().free_bytes, 104 - 24);
}

#[test]
fn freeing_everything_resets_the_heap() {
    let (mut mem, mut a) = setup(4);
    let blocks: Vec<u32> = (1..=5).map(|i| a.malloc(&mut mem, i * 10, 1).unwrap()).collect();
    for (i, p) in blocks.iter().enumerate().rev().step_by(2) {
        a.free(*p, (i as u32 + 1) * 10, 1).unwrap();
    }
    for (i, p) in blocks.iter().enumerate().rev().skip(1).step_by(2) {
        a.free(*p, (i as u32 + 1) * 10, 1).unwrap();
    }
    let stats = a.stats();
    assert_eq!(stats.live_blocks, 0);
    assert_eq!(stats.free_bytes, 0);
    assert_eq!(stats.bump, HEAP_BASE);
}

#[test]
fn realloc_preserves_contents() {
    let (mut mem, mut a) = setup(4);
    let p = a.malloc(&mut mem, 4, 1).unwrap();
    mem.write(p, b"abcd").unwrap();
    let _pin = a.malloc(&mut mem, 8, 1).unwrap();

    let moved = a.realloc(&mut mem, p, 4, 64, 1).unwrap();
    assert_ne!(moved, p);
    assert_eq!(mem.slice(moved, 4).unwrap(), b"abcd");

    let shrunk = a.realloc(&mut mem, moved, 64, 3, 1).unwrap();
    assert_eq!(shrunk, moved);
    assert_eq!(mem.slice(shrunk, 3).unwrap(), b"abc");
}

#[test]
fn realloc_extends_top_block_in_place() {
    let (mut mem, mut a) = setup(4);
    let p = a.malloc(&mut mem, 16, 1).unwrap();
    let q = a.realloc(&mut mem, p, 16, 70_000, 1).unwrap();
    assert_eq!(p, q);
    assert_eq!(mem.pages(), 3);
}

#[test]
fn exhausting_pages_traps() {
    let (mut mem, mut a) = setup(2);
    let err = a.malloc(&mut mem, 2 * PAGE_SIZE as u32, 1).unwrap_err();
    assert_eq!(err.kind(), "guest-trap");
    assert!(err.to_string().contains("out of memory"));
}

#[test]
fn invalid_frees_trap() {
    let (mut mem, mut a) = setup(2);
    let p = a.malloc(&mut mem, 8, 1).unwrap();
    assert!(a.free(p + 8, 8, 1).is_err());
    assert!(a.free(p, 64, 1).is_err());
    assert!(a.malloc(&mut mem, 8, 3).is_err());
    a.free(p, 8, 1).unwrap();
    assert!(a.free(p, 8, 1).is_err());
}

#[test]
fn zero_sized_requests_do_not_allocate() {
    let (mut mem, mut a) = setup(2);
    let p = a.malloc(&mut mem, 0, 1).unwrap();
    assert_ne!(p, 0);
    a.free(p, 0, 1).unwrap();
    assert_eq!(a.stats().live_blocks, 0);
}
