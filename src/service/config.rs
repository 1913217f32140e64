use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::ModuleSource;
use crate::bridge::module::DEFAULT_INITIAL_PAGES;
use crate::compose::Theme;
use crate::converge::DEFAULT_FALLBACK_CAGR;
use crate::foundation::error::{CardError, CardResult};
use crate::params::state::{MAX_GROWTH, MIN_GROWTH};
use crate::params::codec::keys;
use crate::params::{ComparisonState, decode};

/// Largest page count a 32-bit linear memory can address.
const MAX_ADDRESSABLE_PAGES: u32 = 65_536;

/// Growth-rate settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrowthConfig {
    /// Rate used when a side has no explicit rate and no usable history.
    pub fallback_cagr: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            fallback_cagr: DEFAULT_FALLBACK_CAGR,
        }
    }
}

/// Fonts loaded into the rasterizer module.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontConfig {
    /// Load the host's installed fonts.
    pub load_system_fonts: bool,
    /// Extra font files.
    pub files: Vec<PathBuf>,
    /// Directories scanned for font files.
    pub dirs: Vec<PathBuf>,
    /// Family substituted for `sans-serif`.
    pub default_family: Option<String>,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            load_system_fonts: true,
            files: Vec::new(),
            dirs: Vec::new(),
            default_family: None,
        }
    }
}

/// Card service configuration, read from a JSON file.
///
/// Every field is optional; an empty object `{}` is a valid configuration. Unknown keys are
/// rejected so that typos do not silently fall back to defaults.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Listen address for `serve`.
    pub bind: String,
    /// JSON series table loaded into a [`crate::service::StaticStore`].
    pub data_path: Option<PathBuf>,
    /// Rasterizer instances kept warm.
    pub pool_size: usize,
    /// Deadline for one PNG render before the SVG fallback is served.
    pub render_timeout_ms: u64,
    /// `max-age` of PNG responses.
    pub png_max_age_secs: u64,
    /// `max-age` of SVG responses (fallback and `/card.svg`).
    pub svg_max_age_secs: u64,
    /// Growth-rate settings.
    pub growth: GrowthConfig,
    /// Rasterizer fonts.
    pub fonts: FontConfig,
    /// Page limit of each rasterizer instance.
    pub memory_max_pages: u32,
    /// Default palette (`light` or `dark`).
    pub theme: String,
    /// Query string applied over the built-in comparison defaults, e.g. `c=BRA&t=DEU&h=40`.
    pub defaults: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            data_path: None,
            pool_size: crate::bridge::module::DEFAULT_POOL_SIZE,
            render_timeout_ms: 5_000,
            png_max_age_secs: 31_536_000,
            svg_max_age_secs: 300,
            growth: GrowthConfig::default(),
            fonts: FontConfig::default(),
            memory_max_pages: crate::bridge::memory::DEFAULT_MAX_PAGES,
            theme: "light".to_string(),
            defaults: String::new(),
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a configuration from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> CardResult<Self> {
        let cfg: Self = serde_json::from_reader(r)
            .map_err(|e| CardError::validation(format!("parse config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a configuration from a JSON string.
    pub fn from_json_str(s: &str) -> CardResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Parse and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> CardResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            CardError::validation(format!("open config JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> CardResult<()> {
        self.bind.parse::<SocketAddr>().map_err(|e| {
            CardError::validation(format!("bind '{}' is not a socket address: {e}", self.bind))
        })?;
        if self.pool_size == 0 {
            return Err(CardError::validation("pool_size must be at least 1"));
        }
        if self.render_timeout_ms == 0 {
            return Err(CardError::validation("render_timeout_ms must be positive"));
        }
        let cagr = self.growth.fallback_cagr;
        if !(MIN_GROWTH..=MAX_GROWTH).contains(&cagr) {
            return Err(CardError::validation(format!(
                "growth.fallback_cagr must be within [{MIN_GROWTH}, {MAX_GROWTH}], got {cagr}"
            )));
        }
        if !(DEFAULT_INITIAL_PAGES..=MAX_ADDRESSABLE_PAGES).contains(&self.memory_max_pages) {
            return Err(CardError::validation(format!(
                "memory_max_pages must be within {DEFAULT_INITIAL_PAGES}..={MAX_ADDRESSABLE_PAGES}, got {}",
                self.memory_max_pages
            )));
        }
        if Theme::by_name(&self.theme).is_none() {
            return Err(CardError::validation(format!(
                "unknown theme '{}' (expected light or dark)",
                self.theme
            )));
        }
        self.validate_defaults()
    }

    /// Configured defaults may move codes and numbers only; enum and toggle fields stay built-in.
    fn validate_defaults(&self) -> CardResult<()> {
        let state = self.default_state();
        let builtin = ComparisonState::default();
        let moved = [
            (keys::SCOPE, state.scope != builtin.scope),
            (keys::TARGET_MODE, state.target_mode != builtin.target_mode),
            (keys::VIEW, state.view != builtin.view),
            (keys::MILESTONES, state.show_milestones != builtin.show_milestones),
            (keys::ADJUST_CHASER, state.adjust_chaser != builtin.adjust_chaser),
            (keys::ADJUST_TARGET, state.adjust_target != builtin.adjust_target),
        ];
        match moved.iter().find(|(_, differs)| *differs) {
            Some((key, _)) => Err(CardError::validation(format!(
                "defaults may not change '{key}' from its built-in value"
            ))),
            None => Ok(()),
        }
    }

    /// Comparison defaults: the built-in state with [`ServiceConfig::defaults`] decoded over it.
    pub fn default_state(&self) -> ComparisonState {
        decode(&self.defaults, &ComparisonState::default())
    }

    /// Configured palette, light when the name is unknown.
    pub fn theme(&self) -> Theme {
        Theme::by_name(&self.theme).unwrap_or_default()
    }

    /// Render deadline.
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Rasterizer module settings.
    pub fn module_source(&self) -> ModuleSource {
        ModuleSource {
            load_system_fonts: self.fonts.load_system_fonts,
            font_files: self.fonts.files.clone(),
            font_dirs: self.fonts.dirs.clone(),
            default_family: self.fonts.default_family.clone(),
            initial_pages: DEFAULT_INITIAL_PAGES,
            max_pages: self.memory_max_pages,
            pool_size: self.pool_size,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/service/config.rs"]
mod tests;
