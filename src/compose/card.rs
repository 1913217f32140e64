use std::fmt::Write as _;

use crate::compose::chart::{ChartFrame, projection_paths, sparkline};
use crate::compose::format::{escape_xml, format_compact, format_percent, format_years, truncate};
use crate::compose::theme::Theme;
use crate::converge::{Convergence, GrowthSource, Outcome, ProjectionPoint, ResolvedGrowth};
use crate::foundation::core::{Canvas, Observation, Rect};
use crate::params::{ComparisonState, ViewMode};

/// Headline shown whenever the comparison cannot be projected.
pub const UNAVAILABLE_HEADLINE: &str = "Data unavailable";

const MARGIN: f64 = 60.0;
const CARD_X: f64 = 60.0;
const CARD_W: f64 = 340.0;
const CARD_H: f64 = 160.0;
const CHASER_CARD_Y: f64 = 200.0;
const TARGET_CARD_Y: f64 = 380.0;
const PANEL: Rect = Rect::new(440.0, 200.0, 1140.0, 540.0);
const PLOT: Rect = Rect::new(520.0, 228.0, 1116.0, 500.0);
const FOOTER_Y: f64 = 592.0;
const NAME_CHARS: usize = 26;
const TABLE_ROWS: usize = 8;
const FONT: &str = "sans-serif";

/// Display names resolved from the data store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedNames {
    /// Chaser display name (falls back to the code).
    pub chaser: String,
    /// Target display name (falls back to the code).
    pub target: String,
    /// Metric label (falls back to the code).
    pub metric: String,
}

/// Source values resolved from the data store. `None` means missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedValues {
    /// Latest chaser observation.
    pub chaser: Option<Observation>,
    /// Latest target observation.
    pub target: Option<Observation>,
    /// Chaser history, any order.
    pub chaser_history: Vec<Observation>,
    /// Target history, any order.
    pub target_history: Vec<Observation>,
    /// Rate the chaser was projected with, when known.
    pub chaser_growth: Option<ResolvedGrowth>,
    /// Rate the target was projected with, when known.
    pub target_growth: Option<ResolvedGrowth>,
}

/// The composed card and the display values it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderDocument {
    /// Complete, standalone SVG document.
    pub svg: String,
    /// Headline text (unescaped).
    pub headline: String,
    /// Subtitle text (unescaped).
    pub subtitle: String,
    /// Chaser projection path (`M`/`L` commands), empty when degraded.
    pub chaser_path: String,
    /// Target projection path (`M`/`L` commands), empty when degraded.
    pub target_path: String,
}

impl RenderDocument {
    /// `true` when the card was composed without a usable projection.
    pub fn is_degraded(&self) -> bool {
        self.headline == UNAVAILABLE_HEADLINE
    }
}

/// Compose the 1200×630 share card.
///
/// Pure: identical inputs produce byte-identical SVG. A missing value or an empty projection yields
/// the degraded card, which keeps every structural group of the regular layout.
pub fn compose_svg(
    state: &ComparisonState,
    names: &ResolvedNames,
    values: &ResolvedValues,
    projection: Option<&Convergence>,
    theme: &Theme,
) -> RenderDocument {
    let usable = projection
        .filter(|p| !p.series.is_empty())
        .filter(|_| values.chaser.is_some() && values.target.is_some());

    let chaser_name = truncate(&names.chaser, NAME_CHARS);
    let target_name = truncate(&names.target, NAME_CHARS);

    let (headline, subtitle) = match usable {
        Some(p) => (
            headline(&chaser_name, &target_name, p.outcome()),
            format!(
                "{} at {} vs {} a year, projected from {}",
                names.metric,
                format_percent(rate_of(values.chaser_growth, state.chaser_growth)),
                format_percent(rate_of(
                    values.target_growth,
                    state.effective_target_growth()
                )),
                state.base_year
            ),
        ),
        None => (
            UNAVAILABLE_HEADLINE.to_string(),
            format!(
                "No comparable {} figures for {} and {}",
                names.metric, chaser_name, target_name
            ),
        ),
    };

    let frame = usable.and_then(|p| ChartFrame::for_projection(&p.series, PLOT));
    let (chaser_path, target_path) = match (usable, frame.as_ref()) {
        (Some(p), Some(f)) => projection_paths(f, &p.series),
        _ => (String::new(), String::new()),
    };

    let canvas = Canvas::OPEN_GRAPH;
    let bounds = canvas.rect();
    let mut svg = String::with_capacity(8 * 1024);
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="{FONT}">"#,
        w = canvas.width,
        h = canvas.height,
    );
    let _ = write!(
        svg,
        r#"<rect id="background" x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
        bounds.x0,
        bounds.y0,
        bounds.width(),
        bounds.height(),
        theme.background.to_hex()
    );

    svg.push_str(r#"<g id="header">"#);
    push_text(&mut svg, MARGIN, 64.0, 20, theme.muted.to_hex(), false, &names.metric);
    push_text(&mut svg, MARGIN, 116.0, 40, theme.text.to_hex(), true, &headline);
    push_text(&mut svg, MARGIN, 156.0, 22, theme.muted.to_hex(), false, &subtitle);
    svg.push_str("</g>");

    value_card(
        &mut svg,
        "chaser-card",
        CHASER_CARD_Y,
        &chaser_name,
        values.chaser,
        &values.chaser_history,
        theme.chaser.to_hex(),
        theme,
    );
    value_card(
        &mut svg,
        "target-card",
        TARGET_CARD_Y,
        &target_name,
        values.target,
        &values.target_history,
        theme.target.to_hex(),
        theme,
    );

    let _ = write!(
        svg,
        r#"<g id="chart"><rect x="{}" y="{}" width="{}" height="{}" rx="16" fill="{}"/>"#,
        PANEL.x0,
        PANEL.y0,
        PANEL.width(),
        PANEL.height(),
        theme.surface.to_hex()
    );
    match (usable, frame) {
        (Some(p), Some(_)) if state.view == ViewMode::Table => {
            projection_table(&mut svg, p, &chaser_name, &target_name, theme);
        }
        (Some(p), Some(f)) => {
            chart_body(&mut svg, &f, p, state.show_milestones, theme);
            let _ = write!(
                svg,
                r#"<path id="target-line" d="{target_path}" fill="none" stroke="{}" stroke-width="4" stroke-linejoin="round"/>"#,
                theme.target.to_hex()
            );
            let _ = write!(
                svg,
                r#"<path id="chaser-line" d="{chaser_path}" fill="none" stroke="{}" stroke-width="4" stroke-linejoin="round"/>"#,
                theme.chaser.to_hex()
            );
        }
        _ => {
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" font-size="24" fill="{}" text-anchor="middle">No projection available</text>"#,
                PANEL.center().x,
                PANEL.center().y,
                theme.muted.to_hex()
            );
        }
    }
    svg.push_str("</g>");

    svg.push_str(r#"<g id="footer">"#);
    let footer = footer_text(state, names, values, usable);
    push_text(&mut svg, MARGIN, FOOTER_Y, 18, theme.muted.to_hex(), false, &footer);
    svg.push_str("</g></svg>");

    RenderDocument {
        svg,
        headline,
        subtitle,
        chaser_path,
        target_path,
    }
}

fn headline(chaser: &str, target: &str, outcome: Outcome) -> String {
    match outcome {
        Outcome::AlreadyAhead => format!("{chaser} is already ahead of {target}"),
        Outcome::Never => format!("{chaser} does not catch up with {target}"),
        Outcome::Converges { years, year } => format!(
            "{chaser} catches up with {target} in {} ({year})",
            format_years(years)
        ),
    }
}

fn rate_of(resolved: Option<ResolvedGrowth>, assumed: f64) -> f64 {
    resolved.map_or(assumed, |g| g.rate)
}

fn source_label(resolved: Option<ResolvedGrowth>) -> &'static str {
    match resolved.map(|g| g.source) {
        Some(GrowthSource::Historical) => " (historical)",
        Some(GrowthSource::Fallback) => " (assumed)",
        Some(GrowthSource::Explicit) | None => "",
    }
}

fn footer_text(
    state: &ComparisonState,
    names: &ResolvedNames,
    values: &ResolvedValues,
    projection: Option<&Convergence>,
) -> String {
    let mut text = format!(
        "Growth: {} {}{}, {} {}{}",
        truncate(&names.chaser, NAME_CHARS),
        format_percent(rate_of(values.chaser_growth, state.chaser_growth)),
        source_label(values.chaser_growth),
        truncate(&names.target, NAME_CHARS),
        format_percent(rate_of(
            values.target_growth,
            state.effective_target_growth()
        )),
        source_label(values.target_growth),
    );
    if let Some(required) = projection.and_then(|p| p.required_growth) {
        let _ = write!(
            text,
            ". Needed to catch up within {}: {}",
            format_years(f64::from(state.goal_years)),
            format_percent(required)
        );
    }
    text
}

#[allow(clippy::too_many_arguments)]
fn value_card(
    svg: &mut String,
    id: &str,
    y: f64,
    name: &str,
    latest: Option<Observation>,
    history: &[Observation],
    color: String,
    theme: &Theme,
) {
    let _ = write!(
        svg,
        r#"<g id="{id}"><rect x="{CARD_X}" y="{y}" width="{CARD_W}" height="{CARD_H}" rx="16" fill="{}"/>"#,
        theme.surface.to_hex()
    );
    let _ = write!(
        svg,
        r#"<rect x="{}" y="{}" width="8" height="28" rx="4" fill="{color}"/>"#,
        CARD_X + 20.0,
        y + 18.0
    );
    push_text(svg, CARD_X + 38.0, y + 40.0, 20, theme.text.to_hex(), true, name);
    let (value, caption) = match latest.filter(|o| o.is_usable()) {
        Some(o) => (format_compact(o.value), format!("latest, {}", o.year)),
        None => ("n/a".to_string(), "no data".to_string()),
    };
    push_text(svg, CARD_X + 20.0, y + 92.0, 40, theme.text.to_hex(), true, &value);
    push_text(svg, CARD_X + 20.0, y + 118.0, 16, theme.muted.to_hex(), false, &caption);
    let spark = sparkline(
        history,
        Rect::new(CARD_X + 180.0, y + 64.0, CARD_X + CARD_W - 20.0, y + 120.0),
    );
    if !spark.is_empty() {
        let _ = write!(
            svg,
            r#"<path d="{spark}" fill="none" stroke="{color}" stroke-width="2.5"/>"#
        );
    }
    svg.push_str("</g>");
}

fn chart_body(
    svg: &mut String,
    frame: &ChartFrame,
    projection: &Convergence,
    show_milestones: bool,
    theme: &Theme,
) {
    let grid = theme.grid.to_hex();
    let muted = theme.muted.to_hex();
    for tick in frame.value_ticks(5) {
        let p = frame.map(frame.data.x0, tick);
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{grid}" stroke-width="1"/>"#,
            PLOT.x0, p.y, PLOT.x1, p.y
        );
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" font-size="14" fill="{muted}" text-anchor="end">{}</text>"#,
            PLOT.x0 - 10.0,
            p.y + 5.0,
            format_compact(tick)
        );
    }

    let series = &projection.series;
    let (first, last) = (series[0], series[series.len() - 1]);
    let labels = if series.len() > 1 {
        vec![(first.year, "start"), (last.year, "end")]
    } else {
        vec![(first.year, "start")]
    };
    for (year, anchor) in labels {
        let p = frame.map(f64::from(year), frame.data.y0);
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" font-size="14" fill="{muted}" text-anchor="{anchor}">{year}</text>"#,
            p.x,
            PLOT.y1 + 24.0
        );
    }

    if show_milestones {
        let accent = theme.accent.to_hex();
        for m in &projection.milestones {
            let year = f64::from(m.year);
            if year < frame.data.x0 || year > frame.data.x1 {
                continue;
            }
            let top = frame.map(year, frame.data.y1);
            let bottom = frame.map(year, frame.data.y0);
            let _ = write!(
                svg,
                r#"<line class="milestone" x1="{x}" y1="{}" x2="{x}" y2="{}" stroke="{accent}" stroke-width="1.5" stroke-dasharray="6 6"/>"#,
                top.y,
                bottom.y,
                x = top.x
            );
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" font-size="13" fill="{accent}" text-anchor="middle">{:.0}%</text>"#,
                top.x,
                top.y - 6.0,
                m.ratio * 100.0
            );
        }
    }

    if let Outcome::Converges { .. } = projection.outcome()
        && last.chaser_value >= last.target_value
    {
        let p = frame.map(f64::from(last.year), last.target_value);
        let _ = write!(
            svg,
            r#"<circle id="convergence" cx="{}" cy="{}" r="7" fill="{}"/>"#,
            p.x,
            p.y,
            theme.accent.to_hex()
        );
    }
}

fn projection_table(
    svg: &mut String,
    projection: &Convergence,
    chaser: &str,
    target: &str,
    theme: &Theme,
) {
    let muted = theme.muted.to_hex();
    let text = theme.text.to_hex();
    let cols = [PLOT.x0, PLOT.x0 + 180.0, PLOT.x0 + 400.0];
    let header_y = PLOT.y0 + 20.0;
    for (x, label) in cols.iter().zip(["Year", chaser, target]) {
        push_text(svg, *x, header_y, 18, muted.clone(), true, label);
    }
    let _ = write!(
        svg,
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
        PLOT.x0,
        header_y + 12.0,
        PLOT.x1,
        header_y + 12.0,
        theme.grid.to_hex()
    );

    for (row, point) in table_rows(&projection.series).into_iter().enumerate() {
        let y = header_y + 44.0 + 30.0 * row as f64;
        let cells = [
            point.year.to_string(),
            format_compact(point.chaser_value),
            format_compact(point.target_value),
        ];
        for (x, cell) in cols.iter().zip(cells) {
            push_text(svg, *x, y, 18, text.clone(), false, &cell);
        }
    }
}

/// Up to `TABLE_ROWS` points spread over the series, first and last included.
fn table_rows(series: &[ProjectionPoint]) -> Vec<ProjectionPoint> {
    let len = series.len();
    if len <= TABLE_ROWS {
        return series.to_vec();
    }
    (0..TABLE_ROWS)
        .map(|i| series[i * (len - 1) / (TABLE_ROWS - 1)])
        .collect()
}

fn push_text(svg: &mut String, x: f64, y: f64, size: u32, fill: String, bold: bool, text: &str) {
    let weight = if bold { r#" font-weight="700""# } else { "" };
    let _ = write!(
        svg,
        r#"<text x="{x}" y="{y}" font-size="{size}" fill="{fill}"{weight}>{}</text>"#,
        escape_xml(text)
    );
}

#[cfg(test)]
#[path = "../../tests/unit/compose/card.rs"]
mod tests;
