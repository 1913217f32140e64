//! Canonical query-string codec for [`ComparisonState`].
//!
//! `decode` never fails: every field goes parse → fallback → clamp → round, and anything that does
//! not survive falls back to the caller's defaults. `encode` writes the fields in a fixed order and
//! omits toggles and enums that sit at their canonical defaults, so shared links stay short.
//!
//! `decode(encode(s), d) == s` holds for every decoded `s` as long as `d` keeps `scope`,
//! `target_mode`, `view` and the three toggles at the values of [`ComparisonState::default`].

use std::collections::BTreeMap;

use crate::foundation::math::round_scaled;
use crate::params::query::parse_query;
use crate::params::state::{
    ComparisonState, EntityCode, GROWTH_SCALE, MAX_BASE_YEAR, MAX_GROWTH, MAX_YEARS,
    MIN_BASE_YEAR, MIN_GROWTH, MIN_YEARS, MetricCode, RegionCode, Scope, TargetMode, ViewMode,
};

/// Wire keys, in canonical order.
pub mod keys {
    /// Comparison scope (`region` only).
    pub const SCOPE: &str = "scope";
    /// Chaser entity code.
    pub const CHASER: &str = "c";
    /// Target entity code.
    pub const TARGET: &str = "t";
    /// Chaser region code.
    pub const CHASER_REGION: &str = "cr";
    /// Target region code.
    pub const TARGET_REGION: &str = "tr";
    /// Metric code.
    pub const METRIC: &str = "m";
    /// Chaser growth.
    pub const CHASER_GROWTH: &str = "cg";
    /// Target growth.
    pub const TARGET_GROWTH: &str = "tg";
    /// Target mode (`static` only).
    pub const TARGET_MODE: &str = "tm";
    /// Base year.
    pub const BASE_YEAR: &str = "by";
    /// Horizon in years.
    pub const HORIZON: &str = "h";
    /// Goal in years.
    pub const GOAL: &str = "gy";
    /// Milestone toggle.
    pub const MILESTONES: &str = "ms";
    /// Chaser adjustment toggle.
    pub const ADJUST_CHASER: &str = "ac";
    /// Target adjustment toggle.
    pub const ADJUST_TARGET: &str = "at";
    /// View mode (`table` only).
    pub const VIEW: &str = "v";
}

/// Decode a raw query string. Never fails.
pub fn decode(query: &str, defaults: &ComparisonState) -> ComparisonState {
    decode_pairs(parse_query(query), defaults)
}

/// Decode already-split key/value pairs. The last occurrence of a key wins; unknown keys are
/// ignored.
pub fn decode_pairs<I, K, V>(pairs: I, defaults: &ComparisonState) -> ComparisonState
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let map: BTreeMap<String, String> = pairs
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect();
    let get = |k: &str| map.get(k).map(String::as_str);

    let scope = match get(keys::SCOPE).map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("region") => Scope::Region,
        Some(v) if v.eq_ignore_ascii_case("country") => Scope::Country,
        _ => defaults.scope,
    };

    let chaser = get(keys::CHASER)
        .and_then(EntityCode::parse)
        .unwrap_or_else(|| defaults.chaser.clone());
    let target = get(keys::TARGET)
        .and_then(EntityCode::parse)
        .unwrap_or_else(|| defaults.target.clone());

    // Region keys are meaningless outside region scope; ignoring them keeps encode lossless.
    let region = |key: &str, fallback: &RegionCode| match scope {
        Scope::Region => get(key)
            .and_then(RegionCode::parse)
            .unwrap_or_else(|| fallback.clone()),
        Scope::Country => fallback.clone(),
    };
    let chaser_region = region(keys::CHASER_REGION, &defaults.chaser_region);
    let target_region = region(keys::TARGET_REGION, &defaults.target_region);

    let metric = get(keys::METRIC)
        .and_then(MetricCode::parse)
        .unwrap_or_else(|| defaults.metric.clone());

    let target_mode = match get(keys::TARGET_MODE).map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("static") => TargetMode::Static,
        Some(v) if v.eq_ignore_ascii_case("growing") => TargetMode::Growing,
        _ => defaults.target_mode,
    };

    let chaser_growth = canonical_growth(
        parse_number(get(keys::CHASER_GROWTH)).unwrap_or(defaults.chaser_growth),
    );
    let target_growth = match target_mode {
        TargetMode::Static => 0.0,
        TargetMode::Growing => canonical_growth(
            parse_number(get(keys::TARGET_GROWTH)).unwrap_or(defaults.target_growth),
        ),
    };

    let base_year = canonical_base_year(
        parse_number(get(keys::BASE_YEAR)).unwrap_or(f64::from(defaults.base_year)),
    );
    let horizon_years = canonical_years(
        parse_number(get(keys::HORIZON)).unwrap_or(f64::from(defaults.horizon_years)),
    );
    let goal_years = canonical_years(
        parse_number(get(keys::GOAL)).unwrap_or(f64::from(defaults.goal_years)),
    );

    let view = match get(keys::VIEW).map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("table") => ViewMode::Table,
        Some(v) if v.eq_ignore_ascii_case("chart") => ViewMode::Chart,
        _ => defaults.view,
    };

    ComparisonState {
        scope,
        chaser,
        target,
        chaser_region,
        target_region,
        metric,
        chaser_growth,
        target_growth,
        target_mode,
        base_year,
        horizon_years,
        goal_years,
        show_milestones: parse_flag(get(keys::MILESTONES)).unwrap_or(defaults.show_milestones),
        adjust_chaser: parse_flag(get(keys::ADJUST_CHASER)).unwrap_or(defaults.adjust_chaser),
        adjust_target: parse_flag(get(keys::ADJUST_TARGET)).unwrap_or(defaults.adjust_target),
        view,
    }
}

/// Serialize canonically. Static target mode always writes `tg=0`.
pub fn encode(state: &ComparisonState) -> String {
    let mut pairs: Vec<(&str, String)> = Vec::with_capacity(16);

    if state.scope == Scope::Region {
        pairs.push((keys::SCOPE, "region".to_string()));
    }
    pairs.push((keys::CHASER, state.chaser.to_string()));
    pairs.push((keys::TARGET, state.target.to_string()));
    if state.scope == Scope::Region {
        pairs.push((keys::CHASER_REGION, state.chaser_region.to_string()));
        pairs.push((keys::TARGET_REGION, state.target_region.to_string()));
    }
    pairs.push((keys::METRIC, state.metric.to_string()));
    pairs.push((
        keys::CHASER_GROWTH,
        format_rate(canonical_growth(state.chaser_growth)),
    ));
    let target_growth = match state.target_mode {
        TargetMode::Static => 0.0,
        TargetMode::Growing => canonical_growth(state.target_growth),
    };
    pairs.push((keys::TARGET_GROWTH, format_rate(target_growth)));
    if state.target_mode == TargetMode::Static {
        pairs.push((keys::TARGET_MODE, "static".to_string()));
    }
    pairs.push((
        keys::BASE_YEAR,
        canonical_base_year(f64::from(state.base_year)).to_string(),
    ));
    pairs.push((
        keys::HORIZON,
        canonical_years(f64::from(state.horizon_years)).to_string(),
    ));
    pairs.push((
        keys::GOAL,
        canonical_years(f64::from(state.goal_years)).to_string(),
    ));
    for (key, on) in [
        (keys::MILESTONES, state.show_milestones),
        (keys::ADJUST_CHASER, state.adjust_chaser),
        (keys::ADJUST_TARGET, state.adjust_target),
    ] {
        if !on {
            pairs.push((key, "0".to_string()));
        }
    }
    if state.view == ViewMode::Table {
        pairs.push((keys::VIEW, "table".to_string()));
    }

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Clamp to the growth bounds and round to the `0.001` step. Non-finite input maps to zero.
pub fn canonical_growth(rate: f64) -> f64 {
    if !rate.is_finite() {
        return 0.0;
    }
    round_scaled(rate.clamp(MIN_GROWTH, MAX_GROWTH), GROWTH_SCALE)
}

fn canonical_base_year(v: f64) -> i32 {
    v.round()
        .clamp(f64::from(MIN_BASE_YEAR), f64::from(MAX_BASE_YEAR)) as i32
}

fn canonical_years(v: f64) -> u32 {
    v.round().clamp(f64::from(MIN_YEARS), f64::from(MAX_YEARS)) as u32
}

fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Tri-state toggle: explicit off, explicit on, or "inherit".
fn parse_flag(raw: Option<&str>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "0" | "false" | "off" | "no" => Some(false),
        "1" | "true" | "on" | "yes" => Some(true),
        _ => None,
    }
}

/// Shortest decimal form of a rate already on the `0.001` grid (`0.05`, `-0.1`, `0`).
fn format_rate(rate: f64) -> String {
    let s = format!("{rate:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/params/codec.rs"]
mod tests;
