//! Share cards for "when does the chaser catch the target" comparisons.
//!
//! A comparison travels as a query string and ends up as a 1200×630 PNG suitable for Open Graph
//! previews.
//!
//! # Pipeline overview
//!
//! 1. **Decode**: `query -> ComparisonState` ([`params`]); never fails, bad input falls back to
//!    defaults.
//! 2. **Converge**: `values + growth rates -> Convergence` ([`converge`]); closed-form years to
//!    convergence plus a bounded projection series.
//! 3. **Compose**: `state + names + values + projection -> RenderDocument` ([`compose`]); pure,
//!    byte-deterministic SVG.
//! 4. **Rasterize**: `SVG -> PNG` through the [`bridge`] to a sandboxed `resvg` guest with its own
//!    linear memory.
//! 5. **Serve**: [`service`] ties it together and falls back to the SVG whenever rasterization
//!    fails.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic-by-default**: the same query against the same data produces the same bytes,
//!   and the response `ETag` is taken over the SVG.
//! - **Explicit finalization**: guest objects are released by `free()` or `Drop`, never by a
//!   collector.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Render bridge: linear memory, object table, marshalling and the instance pool.
pub mod bridge;
/// SVG card composition.
pub mod compose;
/// Convergence arithmetic.
pub mod converge;
/// Comparison parameters and their URL codec.
pub mod params;
/// Card endpoint orchestration and HTTP surface.
pub mod service;

pub use bridge::{
    BBox, Bounds, FitTo, FontOptions, Instance, ModuleSource, PoolStats, RasterModule,
    RenderBridge, RenderOptions, RenderedImage, RenderedPng, Renderer,
};
pub use compose::{
    RenderDocument, ResolvedNames, ResolvedValues, Theme, UNAVAILABLE_HEADLINE, compose_svg,
};
pub use converge::{
    Convergence, GrowthSource, Milestone, Outcome, ProjectionOpts, ProjectionPoint,
    ResolvedGrowth, project_and_converge, resolve_growth,
};
pub use foundation::core::{Canvas, Observation, Rgb8};
pub use foundation::error::{CardError, CardResult};
pub use foundation::math::Fingerprint;
pub use params::{ComparisonState, Scope, TargetMode, ViewMode, decode, encode};
pub use service::{
    CardResponse, CardService, PreparedCard, SeriesStore, ServiceConfig, StaticStore,
};
