use std::io::Write as _;
use std::sync::Arc;

use super::*;
use crate::bridge::guest::ResvgGuest;
use crate::bridge::module::{ModuleSource, RasterModule};

fn guest() -> ResvgGuest {
    let source = ModuleSource {
        load_system_fonts: false,
        ..ModuleSource::default()
    };
    ResvgGuest::new(Arc::new(RasterModule::compile(&source).unwrap())).unwrap()
}

#[test]
fn pass_str_allocates_exact_length_once() {
    let mut g = guest();
    let (ptr, len) = pass_str(&mut g, "Côte d'Ivoire").unwrap();
    assert_eq!(len, "Côte d'Ivoire".len() as u32);
    assert_eq!(g.alloc_stats().live_blocks, 1);

    let mut views = MemoryViews::new();
    assert_eq!(read_str(&mut views, g.memory(), ptr, len).unwrap(), "Côte d'Ivoire");
    g.free(ptr, len, 1).unwrap();
    assert_eq!(g.alloc_stats().live_blocks, 0);
}

#[test]
fn writer_ascii_fast_path_never_reallocates() {
    let mut g = guest();
    let mut w = GuestWriter::new(&mut g, 16).unwrap();
    w.write_all(b"{\"a\":").unwrap();
    w.write_all(b"1}").unwrap();
    assert_eq!(w.reallocations(), 0);
    let (ptr, len) = w.finish().unwrap();
    assert_eq!(len, 7);

    let mut views = MemoryViews::new();
    assert_eq!(read_str(&mut views, g.memory(), ptr, len).unwrap(), "{\"a\":1}");
    g.free(ptr, len, 1).unwrap();
    assert_eq!(g.alloc_stats().live_blocks, 0);
}

#[test]
fn writer_grows_for_multibyte_text_and_shrinks() {
    let mut g = guest();
    let text = "žluťoučký kůň";
    let mut w = GuestWriter::new(&mut g, text.chars().count()).unwrap();
    w.write_all(text.as_bytes()).unwrap();
    assert_eq!(w.reallocations(), 1);
    let (ptr, len) = w.finish().unwrap();
    assert_eq!(len as usize, text.len());

    let mut views = MemoryViews::new();
    assert_eq!(read_str(&mut views, g.memory(), ptr, len).unwrap(), text);
    g.free(ptr, len, 1).unwrap();
    assert_eq!(g.alloc_stats().live_bytes, 0);
}

#[test]
fn abandoned_writer_frees_its_buffer() {
    let mut g = guest();
    {
        let mut w = GuestWriter::new(&mut g, 32).unwrap();
        w.write_all(b"partial").unwrap();
    }
    assert_eq!(g.alloc_stats().live_blocks, 0);
}

#[test]
fn pass_json_serializes_in_place() {
    let mut g = guest();
    let (ptr, len) = pass_json(&mut g, &serde_json::json!({"fitTo": {"mode": "zoom", "value": 2.0}}), 4)
        .unwrap();
    let mut views = MemoryViews::new();
    let text = read_str(&mut views, g.memory(), ptr, len).unwrap();
    assert_eq!(text, r#"{"fitTo":{"mode":"zoom","value":2.0}}"#);
}

#[test]
fn scratch_slot_is_restored_on_error() {
    let mut g = guest();
    let sp = g.add_to_stack_pointer(0).unwrap();
    let err = with_scratch(&mut g, |guest, retptr| {
        assert_eq!(retptr, sp - 16);
        guest.memory_mut().write_i32(retptr, 5)?;
        Err::<(), _>(CardError::guest("boom"))
    })
    .unwrap_err();
    assert_eq!(err.kind(), "rasterizer");
    assert_eq!(g.add_to_stack_pointer(0).unwrap(), sp);

    let words = with_scratch(&mut g, |guest, retptr| {
        guest.memory_mut().write_i32(retptr + 4, -3)?;
        read_slot::<2>(&mut MemoryViews::new(), guest.memory(), retptr)
    })
    .unwrap();
    assert_eq!(words[1], -3);
    assert_eq!(g.add_to_stack_pointer(0).unwrap(), sp);
}

#[test]
fn invalid_utf8_is_fatal() {
    let mut g = guest();
    let (ptr, len) = pass_bytes(&mut g, &[b'o', b'k', 0xc3]).unwrap();
    let mut views = MemoryViews::new();
    assert_eq!(read_str(&mut views, g.memory(), ptr, len).unwrap_err().kind(), "marshal");
}

#[test]
fn take_bytes_copies_then_frees() {
    let mut g = guest();
    let (ptr, len) = pass_bytes(&mut g, b"\x89PNG").unwrap();
    let mut views = MemoryViews::new();
    assert_eq!(take_bytes(&mut g, &mut views, ptr, len).unwrap(), b"\x89PNG");
    assert_eq!(g.alloc_stats().live_blocks, 0);
    assert!(take_bytes(&mut g, &mut views, ptr, len).is_err());
}
