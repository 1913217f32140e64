use std::sync::Arc;
use std::time::Duration;

use crate::bridge::{FitTo, FontOptions, RenderBridge, RenderOptions, RenderedPng};
use crate::compose::{RenderDocument, ResolvedNames, ResolvedValues, Theme, compose_svg};
use crate::converge::{
    Convergence, GrowthSource, ProjectionOpts, ResolvedGrowth, project_and_converge,
    resolve_growth,
};
use crate::foundation::core::Observation;
use crate::foundation::error::{CardError, CardResult};
use crate::foundation::math::Fingerprint;
use crate::params::codec::canonical_growth;
use crate::params::query::parse_query;
use crate::params::{ComparisonState, TargetMode, decode_pairs};
use crate::service::config::ServiceConfig;
use crate::service::store::SeriesStore;

/// `Content-Type` of rendered cards.
pub const PNG_CONTENT_TYPE: &str = "image/png";
/// `Content-Type` of the SVG fallback.
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";
/// Header set when the SVG fallback was served in place of a PNG.
pub const FALLBACK_HEADER: &str = "x-card-fallback";
/// Header carrying the bridge error kind on fallback.
pub const ERROR_HEADER: &str = "x-card-error";

/// Query key selecting the palette; not part of the comparison state.
const THEME_KEY: &str = "theme";

/// A composed card waiting for rasterization.
#[derive(Clone, Debug)]
pub struct PreparedCard {
    /// Decoded comparison.
    pub state: ComparisonState,
    /// Projection, when both values were available.
    pub convergence: Option<Convergence>,
    /// Composed SVG and its text.
    pub document: RenderDocument,
    /// Palette the card was composed with.
    pub theme: Theme,
    /// Response fingerprint, taken over the SVG bytes.
    pub fingerprint: Fingerprint,
}

/// Transport-independent response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardResponse {
    /// Always `200`; a failed render is answered with the SVG.
    pub status: u16,
    /// `image/png` or `image/svg+xml`.
    pub content_type: &'static str,
    /// `Cache-Control` value.
    pub cache_control: String,
    /// Quoted strong `ETag`.
    pub etag: String,
    /// `true` when the SVG was served because the PNG render failed.
    pub fallback: bool,
    /// Error kind of the failed render.
    pub error_kind: Option<&'static str>,
    /// Response body.
    pub body: Vec<u8>,
}

impl CardResponse {
    /// Response headers with lower-case names.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("content-type", self.content_type.to_string()),
            ("cache-control", self.cache_control.clone()),
            ("etag", self.etag.clone()),
        ];
        if self.fallback {
            out.push((FALLBACK_HEADER, "svg".to_string()));
        }
        if let Some(kind) = self.error_kind {
            out.push((ERROR_HEADER, kind.to_string()));
        }
        out
    }
}

/// Orchestrates decode, lookup, projection, composition and rasterization of one card.
pub struct CardService {
    store: Arc<dyn SeriesStore>,
    bridge: &'static RenderBridge,
    defaults: ComparisonState,
    theme: Theme,
    fallback_cagr: f64,
    png_max_age: u64,
    svg_max_age: u64,
    default_family: Option<String>,
    render_timeout: Duration,
}

impl CardService {
    /// Build a service over `store`, rendering through `bridge`.
    ///
    /// The bridge is not initialized here; until it is, every PNG request takes the SVG fallback.
    pub fn new(
        config: &ServiceConfig,
        store: Arc<dyn SeriesStore>,
        bridge: &'static RenderBridge,
    ) -> CardResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            bridge,
            defaults: config.default_state(),
            theme: config.theme(),
            fallback_cagr: config.growth.fallback_cagr,
            png_max_age: config.png_max_age_secs,
            svg_max_age: config.svg_max_age_secs,
            default_family: config.fonts.default_family.clone(),
            render_timeout: config.render_timeout(),
        })
    }

    /// The bridge renders go through.
    pub fn bridge(&self) -> &'static RenderBridge {
        self.bridge
    }

    /// Deadline for one PNG render.
    pub fn render_timeout(&self) -> Duration {
        self.render_timeout
    }

    /// Comparison defaults requests are decoded against.
    pub fn defaults(&self) -> &ComparisonState {
        &self.defaults
    }

    /// Decode `query` and compose its card. Never fails: missing data yields the degraded card.
    #[tracing::instrument(level = "debug", skip(self), fields(degraded))]
    pub fn prepare(&self, query: &str) -> PreparedCard {
        let pairs = parse_query(query);
        let theme = pairs
            .iter()
            .rev()
            .find(|(k, _)| k == THEME_KEY)
            .and_then(|(_, v)| Theme::by_name(v))
            .unwrap_or_else(|| self.theme.clone());
        let state = decode_pairs(pairs, &self.defaults);
        let prepared = self.prepare_state(state, theme);
        tracing::Span::current().record("degraded", prepared.document.is_degraded());
        prepared
    }

    /// Compose the card for an already decoded state.
    pub fn prepare_state(&self, state: ComparisonState, theme: Theme) -> PreparedCard {
        let (chaser_code, target_code) = state.lookup_codes();
        let metric = state.metric.as_str();
        let store = self.store.as_ref();

        let names = ResolvedNames {
            chaser: store.entity_name(chaser_code).unwrap_or(chaser_code).to_string(),
            target: store.entity_name(target_code).unwrap_or(target_code).to_string(),
            metric: store.metric_name(metric).unwrap_or(metric).to_string(),
        };

        let chaser_history = store.history(metric, chaser_code).to_vec();
        let target_history = store.history(metric, target_code).to_vec();
        let chaser_growth = self.growth(
            state.adjust_chaser.then_some(state.chaser_growth),
            &chaser_history,
        );
        let target_growth = match state.target_mode {
            TargetMode::Static => ResolvedGrowth {
                rate: 0.0,
                source: GrowthSource::Explicit,
            },
            TargetMode::Growing => self.growth(
                state.adjust_target.then_some(state.target_growth),
                &target_history,
            ),
        };

        let values = ResolvedValues {
            chaser: store.latest(metric, chaser_code),
            target: store.latest(metric, target_code),
            chaser_history,
            target_history,
            chaser_growth: Some(chaser_growth),
            target_growth: Some(target_growth),
        };

        let opts = ProjectionOpts {
            horizon_years: state.horizon_years,
            goal_years: state.goal_years,
            ..ProjectionOpts::default()
        };
        let convergence = match (values.chaser, values.target) {
            (Some(c), Some(t)) => project_and_converge(
                c.value,
                t.value,
                chaser_growth.rate,
                target_growth.rate,
                state.base_year,
                opts,
            ),
            _ => None,
        };
        if convergence.is_none() {
            tracing::debug!(
                chaser = chaser_code,
                target = target_code,
                metric,
                "no projection; composing degraded card"
            );
        }

        let document = compose_svg(&state, &names, &values, convergence.as_ref(), &theme);
        let fingerprint = Fingerprint::of_bytes(document.svg.as_bytes());
        PreparedCard {
            state,
            convergence,
            document,
            theme,
            fingerprint,
        }
    }

    /// Rasterizer options for a prepared card.
    pub fn render_options(&self, prepared: &PreparedCard) -> RenderOptions {
        RenderOptions {
            fit_to: FitTo::Original,
            background: Some(prepared.theme.background),
            font: FontOptions {
                default_family: self.default_family.clone(),
            },
        }
    }

    /// Rasterize a prepared card on the calling thread.
    pub fn render(&self, prepared: &PreparedCard) -> CardResult<RenderedPng> {
        self.bridge
            .render(&prepared.document.svg, &self.render_options(prepared))
    }

    /// Turn a render outcome into the response. A failed render is logged and answered with the
    /// SVG.
    pub fn respond(
        &self,
        prepared: &PreparedCard,
        rendered: CardResult<RenderedPng>,
    ) -> CardResponse {
        match rendered {
            Ok(png) => CardResponse {
                status: 200,
                content_type: PNG_CONTENT_TYPE,
                cache_control: format!("public, max-age={}, immutable", self.png_max_age),
                etag: prepared.fingerprint.etag(),
                fallback: false,
                error_kind: None,
                body: png.data,
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = e.kind(),
                    headline = %prepared.document.headline,
                    "png render failed; serving svg"
                );
                CardResponse {
                    fallback: true,
                    error_kind: Some(e.kind()),
                    ..self.svg_response(prepared)
                }
            }
        }
    }

    /// The SVG itself, as served by `/card.svg` and the fallback path.
    pub fn svg_response(&self, prepared: &PreparedCard) -> CardResponse {
        CardResponse {
            status: 200,
            content_type: SVG_CONTENT_TYPE,
            cache_control: format!("public, max-age={}", self.svg_max_age),
            etag: prepared.fingerprint.etag(),
            fallback: false,
            error_kind: None,
            body: prepared.document.svg.clone().into_bytes(),
        }
    }

    /// Prepare, render and respond on the calling thread.
    #[tracing::instrument(skip(self), fields(query_len = query.len()))]
    pub fn handle(&self, query: &str) -> CardResponse {
        let prepared = self.prepare(query);
        let rendered = self.render(&prepared);
        self.respond(&prepared, rendered)
    }

    fn growth(&self, explicit: Option<f64>, history: &[Observation]) -> ResolvedGrowth {
        let resolved = resolve_growth(explicit, history, self.fallback_cagr);
        ResolvedGrowth {
            rate: canonical_growth(resolved.rate),
            ..resolved
        }
    }
}

/// Fallback for a render that never finished.
pub(crate) fn timeout_error(after: Duration) -> CardError {
    CardError::Other(anyhow::anyhow!(
        "render timed out after {} ms",
        after.as_millis()
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/service/card.rs"]
mod tests;
