use std::sync::Arc;

use anyhow::Context as _;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::bridge::RenderBridge;
use crate::foundation::error::CardError;
use crate::service::card::{CardResponse, CardService, timeout_error};
use crate::service::config::ServiceConfig;
use crate::service::store::{SeriesStore, StaticStore};

// ── Router ──────────────────────────────────────────────────────────

/// Routes: `GET /card`, `GET /card.svg`, `GET /health`.
pub fn router(service: Arc<CardService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/card", get(card))
        .route("/card.svg", get(card_svg))
        .with_state(service)
}

/// Load the series table, initialize the global bridge and serve until the listener closes.
pub async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    config.validate()?;
    let store: Arc<dyn SeriesStore> = match &config.data_path {
        Some(path) => Arc::new(StaticStore::from_path(path)?),
        None => {
            tracing::warn!("no data_path configured; every card will be degraded");
            Arc::new(StaticStore::empty())
        }
    };

    let bridge = RenderBridge::global();
    bridge.init_async(config.module_source()).await?;
    let service = Arc::new(CardService::new(&config, store, bridge)?);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "card service listening");
    axum::serve(listener, router(service))
        .await
        .context("serve http")?;
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────────

async fn health(State(service): State<Arc<CardService>>) -> impl IntoResponse {
    let bridge = service.bridge();
    let stats = bridge.stats();
    Json(serde_json::json!({
        "status": "ok",
        "renderer": bridge.is_initialized(),
        "pool": {
            "created": stats.created,
            "reused": stats.reused,
            "discarded": stats.discarded,
            "idle": stats.idle,
        },
    }))
}

async fn card(
    State(service): State<Arc<CardService>>,
    RawQuery(query): RawQuery,
) -> CardResponse {
    let query = query.unwrap_or_default();
    let prepared = service.prepare(&query);

    let bridge = service.bridge();
    let svg = prepared.document.svg.clone();
    let opts = service.render_options(&prepared);
    let job = tokio::task::spawn_blocking(move || bridge.render(&svg, &opts));

    let deadline = service.render_timeout();
    let rendered = match tokio::time::timeout(deadline, job).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(CardError::Other(anyhow::anyhow!("render task failed: {e}"))),
        Err(_) => Err(timeout_error(deadline)),
    };
    service.respond(&prepared, rendered)
}

async fn card_svg(
    State(service): State<Arc<CardService>>,
    RawQuery(query): RawQuery,
) -> CardResponse {
    let prepared = service.prepare(query.as_deref().unwrap_or_default());
    service.svg_response(&prepared)
}

// ── Responses ───────────────────────────────────────────────────────

impl IntoResponse for CardResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in self.headers() {
            match HeaderValue::from_str(&value) {
                Ok(v) => {
                    headers.insert(HeaderName::from_static(name), v);
                }
                Err(e) => tracing::warn!(header = name, error = %e, "dropped invalid header"),
            }
        }
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, headers, self.body).into_response()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/service/http.rs"]
mod tests;
