use super::*;

fn s(v: &str) -> HostValue {
    HostValue::String(v.to_string())
}

#[test]
fn constants_are_reserved_and_never_recycled() {
    let mut heap = HeapTable::new();
    assert_eq!(heap.insert(HostValue::Null).unwrap(), NULL);
    assert_eq!(heap.insert(HostValue::Bool(false)).unwrap(), FALSE);
    assert_eq!(heap.live(), 0);

    assert_eq!(heap.take(TRUE).unwrap(), HostValue::Bool(true));
    assert_eq!(heap.get(TRUE).unwrap(), &HostValue::Bool(true));
    heap.drop_ref(UNDEFINED).unwrap();

    let h = heap.insert(s("first")).unwrap();
    assert_eq!(h.index(), RESERVED);
}

#[test]
fn free_list_recycles_slots_in_lifo_order() {
    let mut heap = HeapTable::new();
    let a = heap.insert(s("a")).unwrap();
    let b = heap.insert(s("b")).unwrap();
    assert_eq!(heap.live(), 2);

    heap.drop_ref(a).unwrap();
    heap.drop_ref(b).unwrap();
    assert_eq!(heap.live(), 0);

    let c = heap.insert(s("c")).unwrap();
    let d = heap.insert(s("d")).unwrap();
    assert_eq!(c.index(), b.index());
    assert_eq!(d.index(), a.index());
    assert_eq!(heap.capacity(), RESERVED as usize + 2);
}

#[test]
fn dropped_handle_is_stale_even_after_reuse() {
    let mut heap = HeapTable::new();
    let old = heap.insert(s("old")).unwrap();
    heap.drop_ref(old).unwrap();
    let new = heap.insert(s("new")).unwrap();

    assert_eq!(old.index(), new.index());
    assert_ne!(old.generation(), new.generation());
    assert!(matches!(
        heap.get(old),
        Err(CardError::StaleHandle { index, .. }) if index == old.index()
    ));
    assert!(heap.drop_ref(old).is_err());
    assert_eq!(heap.get(new).unwrap(), &s("new"));
    assert_eq!(heap.live(), 1);
}

#[test]
fn unknown_index_is_stale() {
    let heap = HeapTable::new();
    assert_eq!(heap.get(Handle::from_raw(999)).unwrap_err().kind(), "stale-handle");
}

#[test]
fn take_string_checks_type() {
    let mut heap = HeapTable::new();
    let h = heap.insert(HostValue::Bytes(vec![1, 2])).unwrap();
    assert_eq!(heap.take_string(h).unwrap_err().kind(), "marshal");
    let h = heap.insert(s("boom")).unwrap();
    assert_eq!(heap.take_string(h).unwrap(), "boom");
    assert_eq!(heap.live(), 0);
}

#[test]
fn imports_move_bytes_across_memory() {
    let mut heap = HeapTable::new();
    let mut mem = LinearMemory::new(1, 1).unwrap();
    mem.write(100, "héllo".as_bytes()).unwrap();

    let h = heap.string_new(&mem, 100, 6).unwrap();
    assert_eq!(heap.object_byte_len(h).unwrap(), 6);
    heap.object_copy_into(h, &mut mem, 200).unwrap();
    assert_eq!(mem.slice(200, 6).unwrap(), "héllo".as_bytes());
    heap.object_drop_ref(h).unwrap();
    assert_eq!(heap.live(), 0);

    mem.write(300, &[0xff, 0xfe]).unwrap();
    assert_eq!(heap.string_new(&mem, 300, 2).unwrap_err().kind(), "marshal");
    assert_eq!(heap.live(), 0);
}
