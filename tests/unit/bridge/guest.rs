use super::*;
use crate::bridge::heap::{Handle, HeapTable};
use crate::bridge::marshal::{SCRATCH_BYTES, pass_json, pass_str};
use crate::bridge::module::ModuleSource;

const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20"><rect width="40" height="20" fill="#00ff00"/></svg>"##;

fn guest() -> ResvgGuest {
    let source = ModuleSource {
        load_system_fonts: false,
        ..ModuleSource::default()
    };
    ResvgGuest::new(Arc::new(RasterModule::compile(&source).unwrap())).unwrap()
}

fn slot3(g: &ResvgGuest, retptr: u32) -> [i32; 3] {
    let m = g.memory();
    [
        m.read_i32(retptr).unwrap(),
        m.read_i32(retptr + 4).unwrap(),
        m.read_i32(retptr + 8).unwrap(),
    ]
}

fn new_renderer(g: &mut ResvgGuest, heap: &mut HeapTable, svg: &str) -> [i32; 3] {
    let (svg_ptr, svg_len) = pass_str(g, svg).unwrap();
    let (opts_ptr, opts_len) = pass_json(g, &RenderOptions::default(), 64).unwrap();
    let retptr = g.add_to_stack_pointer(-SCRATCH_BYTES).unwrap();
    g.renderer_new(heap, retptr, svg_ptr, svg_len, opts_ptr, opts_len)
        .unwrap();
    let slot = slot3(g, retptr);
    g.add_to_stack_pointer(SCRATCH_BYTES).unwrap();
    slot
}

#[test]
fn target_size_follows_fit_mode() {
    assert_eq!(target_size(1200.0, 630.0, FitTo::Original), Ok((1200, 630)));
    assert_eq!(target_size(1200.0, 630.0, FitTo::Width(600)), Ok((600, 315)));
    assert_eq!(target_size(1200.0, 630.0, FitTo::Height(315)), Ok((600, 315)));
    assert_eq!(target_size(1200.0, 630.0, FitTo::Zoom(2.0)), Ok((2400, 1260)));
}

#[test]
fn target_size_rejects_degenerate_and_oversized() {
    assert!(target_size(0.0, 10.0, FitTo::Original).is_err());
    assert!(target_size(f32::NAN, 10.0, FitTo::Original).is_err());
    assert!(target_size(100.0, 100.0, FitTo::Zoom(0.0)).is_err());
    let err = target_size(1200.0, 630.0, FitTo::Width(MAX_DIM + 1)).unwrap_err();
    assert!(err.contains("too large"), "{err}");
}

#[test]
fn demultiply_restores_straight_alpha() {
    let mut px = [64u8, 32, 0, 128, 10, 20, 30, 255, 0, 0, 0, 0];
    demultiply_rgba8_in_place(&mut px);
    assert_eq!(px, [128, 64, 0, 128, 10, 20, 30, 255, 0, 0, 0, 0]);
}

#[test]
fn renderer_new_consumes_inputs_and_creates_object() {
    let mut g = guest();
    let mut heap = HeapTable::new();
    let [renderer, err, is_err] = new_renderer(&mut g, &mut heap, SVG);
    assert_eq!((err, is_err), (0, 0));
    assert_eq!(g.live_objects(), 1);
    // Only the object header remains.
    assert_eq!(g.alloc_stats().live_blocks, 1);
    assert_eq!(g.renderer_width(renderer as u32).unwrap(), 40.0);
    assert_eq!(g.renderer_height(renderer as u32).unwrap(), 20.0);

    g.renderer_free(renderer as u32).unwrap();
    assert_eq!(g.live_objects(), 0);
    assert_eq!(g.alloc_stats().live_blocks, 0);
}

#[test]
fn parse_failure_is_reported_through_the_slot() {
    let mut g = guest();
    let mut heap = HeapTable::new();
    let [value, err, is_err] = new_renderer(&mut g, &mut heap, "<svg");
    assert_eq!((value, is_err), (0, 1));

    let msg = heap.take_string(Handle::from_raw(err as u32)).unwrap();
    assert!(msg.starts_with("parse svg"), "{msg}");
    assert_eq!(heap.live(), 0);
    assert_eq!(g.live_objects(), 0);
    assert_eq!(g.alloc_stats().live_blocks, 0);
}

#[test]
fn render_then_png_round_trip_in_guest_memory() {
    let mut g = guest();
    let mut heap = HeapTable::new();
    let [renderer, _, _] = new_renderer(&mut g, &mut heap, SVG);

    let retptr = g.add_to_stack_pointer(-SCRATCH_BYTES).unwrap();
    g.renderer_render(&mut heap, retptr, renderer as u32).unwrap();
    let [image, _, is_err] = slot3(&g, retptr);
    assert_eq!(is_err, 0);
    assert_eq!(g.image_width(image as u32).unwrap(), 40);
    assert_eq!(g.image_height(image as u32).unwrap(), 20);

    g.image_as_png(&mut heap, retptr, image as u32).unwrap();
    let ptr = g.memory().read_i32(retptr).unwrap() as u32;
    let len = g.memory().read_i32(retptr + 4).unwrap() as u32;
    assert_eq!(g.memory().read_i32(retptr + 12).unwrap(), 0);
    assert_eq!(&g.memory().slice(ptr, len).unwrap()[..4], b"\x89PNG");
    g.add_to_stack_pointer(SCRATCH_BYTES).unwrap();

    g.free(ptr, len, 1).unwrap();
    g.image_free(image as u32).unwrap();
    g.renderer_free(renderer as u32).unwrap();
    assert_eq!(g.live_objects(), 0);
    assert_eq!(g.alloc_stats().live_blocks, 0);
}

#[test]
fn kind_mismatch_and_dangling_pointers_trap() {
    let mut g = guest();
    let mut heap = HeapTable::new();
    let [renderer, _, _] = new_renderer(&mut g, &mut heap, SVG);

    assert_eq!(g.image_width(renderer as u32).unwrap_err().kind(), "guest-trap");
    assert_eq!(g.bbox_x(renderer as u32).unwrap_err().kind(), "guest-trap");
    g.renderer_free(renderer as u32).unwrap();
    assert_eq!(g.renderer_free(renderer as u32).unwrap_err().kind(), "guest-trap");
    assert_eq!(g.renderer_width(0).unwrap_err().kind(), "guest-trap");
}

#[test]
fn inner_bbox_reports_drawn_content() {
    let mut g = guest();
    let mut heap = HeapTable::new();
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100"><rect x="5" y="6" width="7" height="8"/></svg>"##;
    let [renderer, _, _] = new_renderer(&mut g, &mut heap, svg);

    let bbox = g.renderer_inner_bbox(renderer as u32).unwrap();
    assert_ne!(bbox, 0);
    assert_eq!(g.bbox_x(bbox).unwrap(), 5.0);
    assert_eq!(g.bbox_y(bbox).unwrap(), 6.0);
    assert_eq!(g.bbox_width(bbox).unwrap(), 7.0);
    assert_eq!(g.bbox_height(bbox).unwrap(), 8.0);
    g.bbox_free(bbox).unwrap();
    g.renderer_free(renderer as u32).unwrap();
    assert_eq!(g.live_objects(), 0);
}
