//! Card endpoint: data lookup, orchestration, configuration and the HTTP surface.
//!
//! Every request answers `200`. A failed or timed-out PNG render degrades to the composed SVG,
//! never to an error page.

/// Orchestration from query string to response.
pub mod card;
/// Service configuration.
pub mod config;
/// `axum` routes.
pub mod http;
/// Series lookup.
pub mod store;

pub use card::{CardResponse, CardService, PreparedCard};
pub use config::{FontConfig, GrowthConfig, ServiceConfig};
pub use http::{router, serve};
pub use store::{SeriesStore, StaticStore};
