use std::fmt;

/// Growth-rate lower bound (fraction per year).
pub const MIN_GROWTH: f64 = -0.10;
/// Growth-rate upper bound (fraction per year).
pub const MAX_GROWTH: f64 = 0.15;
/// Growth rates are rounded to multiples of `1 / GROWTH_SCALE`.
pub const GROWTH_SCALE: f64 = 1000.0;
/// Earliest accepted base year.
pub const MIN_BASE_YEAR: i32 = 1950;
/// Latest accepted base year.
pub const MAX_BASE_YEAR: i32 = 2100;
/// Smallest horizon/goal span in years.
pub const MIN_YEARS: u32 = 1;
/// Largest horizon/goal span in years. Also the projection cap.
pub const MAX_YEARS: u32 = 150;
/// Default horizon/goal span in years.
pub const DEFAULT_YEARS: u32 = 25;

/// Three-letter uppercase entity (country) code, `[A-Z]{3}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityCode(String);

impl EntityCode {
    /// Validate after trimming and upper-casing. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_uppercase();
        (s.len() == 3 && s.bytes().all(|b| b.is_ascii_uppercase())).then_some(Self(s))
    }

    /// Code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Metric code, `[A-Z0-9_]{2,64}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricCode(String);

impl MetricCode {
    /// Validate after trimming and upper-casing. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_uppercase();
        let ok = (2..=64).contains(&s.len())
            && s.bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
        ok.then_some(Self(s))
    }

    /// Code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sub-national region code, `^[A-Z]{2,3}(-[A-Z]{2})?[0-9]?$` (e.g. `US-CA`, `DEU`, `FR-IL1`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCode(String);

impl RegionCode {
    /// Validate after trimming and upper-casing. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_uppercase();
        let b = s.as_bytes();

        let head = b.iter().take_while(|c| c.is_ascii_uppercase()).count();
        if !(2..=3).contains(&head) {
            return None;
        }
        let mut i = head;
        if b.get(i) == Some(&b'-') {
            let sub = &b[i + 1..];
            if sub.len() < 2 || !sub[..2].iter().all(u8::is_ascii_uppercase) {
                return None;
            }
            i += 3;
        }
        if b.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        (i == b.len()).then_some(Self(s))
    }

    /// Code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_code_display {
    ($($t:ty),*) => {$(
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    )*};
}

impl_code_display!(EntityCode, MetricCode, RegionCode);

/// How the target's growth is modelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TargetMode {
    /// The target grows at `target_growth`.
    #[default]
    Growing,
    /// The target stands still; `target_growth` is pinned to exactly zero.
    Static,
}

/// Presentation of the projection on the card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Line chart of both trajectories.
    #[default]
    Chart,
    /// Table of selected projection years.
    Table,
}

/// Whether the comparison is between countries or sub-national regions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Scope {
    /// Country codes (`c`, `t`) drive the lookup.
    #[default]
    Country,
    /// Region codes (`cr`, `tr`) drive the lookup.
    Region,
}

/// Canonical, validated parameters of one comparison.
///
/// Built from a query string and a defaults object for every request and never mutated afterwards.
/// The URL is the durable form; see [`crate::params::codec`].
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonState {
    /// Country or region comparison.
    pub scope: Scope,
    /// Entity that starts behind.
    pub chaser: EntityCode,
    /// Entity being chased.
    pub target: EntityCode,
    /// Chaser region (region scope only).
    pub chaser_region: RegionCode,
    /// Target region (region scope only).
    pub target_region: RegionCode,
    /// Metric both series are read from.
    pub metric: MetricCode,
    /// Annual chaser growth, clamped to `[MIN_GROWTH, MAX_GROWTH]`, step `0.001`.
    pub chaser_growth: f64,
    /// Annual target growth; always `0.0` when `target_mode` is `Static`.
    pub target_growth: f64,
    /// Target growth model.
    pub target_mode: TargetMode,
    /// First projected year, `[MIN_BASE_YEAR, MAX_BASE_YEAR]`.
    pub base_year: i32,
    /// Projection horizon when no convergence exists, `[MIN_YEARS, MAX_YEARS]`.
    pub horizon_years: u32,
    /// Catch-up goal used for the required-growth figure, `[MIN_YEARS, MAX_YEARS]`.
    pub goal_years: u32,
    /// Draw milestone markers on the chart.
    pub show_milestones: bool,
    /// Use the explicit chaser rate instead of the historical CAGR.
    pub adjust_chaser: bool,
    /// Use the explicit target rate instead of the historical CAGR.
    pub adjust_target: bool,
    /// Chart or table presentation.
    pub view: ViewMode,
}

impl ComparisonState {
    /// Growth rate the target is projected with, honoring `Static`.
    pub fn effective_target_growth(&self) -> f64 {
        match self.target_mode {
            TargetMode::Static => 0.0,
            TargetMode::Growing => self.target_growth,
        }
    }

    /// Labels used to look the two sides up in the data store.
    pub fn lookup_codes(&self) -> (&str, &str) {
        match self.scope {
            Scope::Country => (self.chaser.as_str(), self.target.as_str()),
            Scope::Region => (self.chaser_region.as_str(), self.target_region.as_str()),
        }
    }
}

impl Default for ComparisonState {
    fn default() -> Self {
        // Literals below satisfy their respective code formats.
        Self {
            scope: Scope::Country,
            chaser: EntityCode("IND".to_string()),
            target: EntityCode("USA".to_string()),
            chaser_region: RegionCode("IN-MH".to_string()),
            target_region: RegionCode("US-CA".to_string()),
            metric: MetricCode("NY_GDP_PCAP_KD".to_string()),
            chaser_growth: 0.05,
            target_growth: 0.02,
            target_mode: TargetMode::Growing,
            base_year: 2023,
            horizon_years: DEFAULT_YEARS,
            goal_years: DEFAULT_YEARS,
            show_milestones: true,
            adjust_chaser: true,
            adjust_target: true,
            view: ViewMode::Chart,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/params/state.rs"]
mod tests;
