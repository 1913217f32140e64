use super::*;

#[test]
fn open_graph_canvas_rect() {
    let r = Canvas::OPEN_GRAPH.rect();
    assert_eq!(r.width(), 1200.0);
    assert_eq!(r.height(), 630.0);
}

#[test]
fn rgb_hex_roundtrip_and_rejects() {
    let c = Rgb8::parse_hex("#1A2b3C").unwrap();
    assert_eq!(c, Rgb8::new(0x1a, 0x2b, 0x3c));
    assert_eq!(c.to_hex(), "#1a2b3c");
    assert_eq!(Rgb8::parse_hex("ffffff").unwrap(), Rgb8::new(255, 255, 255));
    assert!(Rgb8::parse_hex("#fff").is_err());
    assert!(Rgb8::parse_hex("#gg0000").is_err());
}

#[test]
fn observation_usable_requires_positive_finite() {
    assert!(Observation::new(2020, 1.0).is_usable());
    assert!(!Observation::new(2020, 0.0).is_usable());
    assert!(!Observation::new(2020, -3.0).is_usable());
    assert!(!Observation::new(2020, f64::NAN).is_usable());
}
