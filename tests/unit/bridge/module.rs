use super::*;

const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20"><circle cx="10" cy="10" r="8" fill="#123456"/></svg>"##;
const WIDE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="1200" height="630"><rect width="1200" height="630"/></svg>"##;

fn source() -> ModuleSource {
    ModuleSource {
        load_system_fonts: false,
        ..ModuleSource::default()
    }
}

#[test]
fn render_before_init_fails() {
    let bridge = RenderBridge::new();
    assert!(!bridge.is_initialized());
    let err = bridge.render(SVG, &RenderOptions::default()).unwrap_err();
    assert!(matches!(err, CardError::NotInitialized));
    assert!(matches!(bridge.checkout(), Err(CardError::NotInitialized)));
}

#[test]
fn second_init_is_rejected() {
    let bridge = RenderBridge::new();
    bridge.init(&source()).unwrap();
    assert!(matches!(
        bridge.init(&source()),
        Err(CardError::AlreadyInitialized)
    ));
    assert!(bridge.render(SVG, &RenderOptions::default()).is_ok());
}

#[test]
fn invalid_page_limits_fail_to_compile() {
    let bad = ModuleSource {
        initial_pages: 10,
        max_pages: 4,
        ..source()
    };
    let bridge = RenderBridge::new();
    assert_eq!(bridge.init(&bad).unwrap_err().kind(), "validation");
    assert!(!bridge.is_initialized());
}

#[test]
fn pool_reuses_instances() {
    let bridge = RenderBridge::new();
    bridge.init(&source()).unwrap();
    for _ in 0..3 {
        let png = bridge.render(SVG, &RenderOptions::default()).unwrap();
        assert_eq!((png.width, png.height), (40, 20));
    }
    let stats = bridge.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.reused, 2);
    assert_eq!(stats.idle, 1);
}

#[test]
fn pool_is_bounded() {
    let bridge = RenderBridge::new();
    bridge
        .init(&ModuleSource {
            pool_size: 1,
            ..source()
        })
        .unwrap();
    {
        let a = bridge.checkout().unwrap();
        let b = bridge.checkout().unwrap();
        let c = bridge.checkout().unwrap();
        assert_eq!(a.heap_live() + b.heap_live() + c.heap_live(), 0);
    }
    let stats = bridge.stats();
    assert_eq!(stats.created, 3);
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.discarded, 2);
}

#[test]
fn poisoned_instances_are_not_returned() {
    let bridge = RenderBridge::new();
    bridge
        .init(&ModuleSource {
            max_pages: 8,
            ..source()
        })
        .unwrap();
    let err = bridge.render(WIDE, &RenderOptions::default()).unwrap_err();
    assert_eq!(err.kind(), "guest-trap");
    let stats = bridge.stats();
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.idle, 0);

    // The next render gets a fresh instance.
    assert!(bridge.render(SVG, &RenderOptions::default()).is_ok());
    assert_eq!(bridge.stats().created, 2);
}

#[tokio::test]
async fn init_async_compiles_off_the_runtime() {
    let bridge = RenderBridge::new();
    bridge.init_async(source()).await.unwrap();
    assert!(bridge.is_initialized());
    assert!(matches!(
        bridge.init_async(source()).await,
        Err(CardError::AlreadyInitialized)
    ));
}
