use super::*;
use crate::bridge::ModuleSource;
use crate::foundation::core::Observation;

fn service(ready: bool, timeout_ms: u64) -> Arc<CardService> {
    let bridge: &'static RenderBridge = Box::leak(Box::new(RenderBridge::new()));
    if ready {
        bridge
            .init(&ModuleSource {
                load_system_fonts: false,
                pool_size: 1,
                ..ModuleSource::default()
            })
            .unwrap();
    }
    let store = StaticStore::empty()
        .with_entity("BRA", "Brazil")
        .with_entity("DEU", "Germany")
        .with_series("NY_GDP_PCAP_KD", "BRA", vec![Observation::new(2023, 9000.0)])
        .with_series("NY_GDP_PCAP_KD", "DEU", vec![Observation::new(2023, 48000.0)]);
    let config = ServiceConfig {
        render_timeout_ms: timeout_ms,
        ..ServiceConfig::default()
    };
    Arc::new(CardService::new(&config, Arc::new(store), bridge).unwrap())
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn card_renders_png_with_cache_headers() {
    let svc = service(true, 5_000);
    let resp = card(State(svc), RawQuery(Some("c=BRA&t=DEU".to_string())))
        .await
        .into_response();
    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers().clone();
    assert_eq!(headers["content-type"], "image/png");
    assert_eq!(headers["cache-control"], "public, max-age=31536000, immutable");
    assert!(headers["etag"].to_str().unwrap().starts_with('"'));
    assert!(headers.get("x-card-fallback").is_none());
    assert!(body_bytes(resp).await.starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn card_without_renderer_serves_svg_fallback() {
    let svc = service(false, 5_000);
    let resp = card(State(svc), RawQuery(None)).await.into_response();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/svg+xml");
    assert_eq!(resp.headers()["x-card-fallback"], "svg");
    assert_eq!(resp.headers()["x-card-error"], "not-initialized");
    assert_eq!(resp.headers()["cache-control"], "public, max-age=300");
    let body = body_bytes(resp).await;
    assert!(String::from_utf8(body).unwrap().contains("</svg>"));
}

#[tokio::test]
async fn card_svg_route_never_rasterizes() {
    let svc = service(true, 5_000);
    let resp = card_svg(State(Arc::clone(&svc)), RawQuery(Some("c=BRA&t=DEU".to_string())))
        .await
        .into_response();
    assert_eq!(resp.headers()["content-type"], "image/svg+xml");
    assert!(resp.headers().get("x-card-fallback").is_none());
    assert_eq!(svc.bridge().stats().created, 0);
}

#[tokio::test]
async fn svg_and_png_share_the_etag() {
    let svc = service(true, 5_000);
    let q = || RawQuery(Some("c=BRA&t=DEU&v=table".to_string()));
    let png = card(State(Arc::clone(&svc)), q()).await.into_response();
    let svg = card_svg(State(svc), q()).await.into_response();
    assert_eq!(png.headers()["etag"], svg.headers()["etag"]);
}

#[tokio::test]
async fn health_reports_renderer_state() {
    let svc = service(false, 5_000);
    let resp = health(State(svc)).await.into_response();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["renderer"], false);
    assert_eq!(json["pool"]["created"], 0);
}
