use crate::converge::ProjectionPoint;
use crate::foundation::core::{Affine, BezPath, Observation, Point, Rect};

/// Maps `(year, value)` data space into a viewport rectangle (y grows downwards in SVG).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChartFrame {
    /// Target viewport in canvas pixels.
    pub viewport: Rect,
    /// Data-space bounds: `x` is the year, `y` the value.
    pub data: Rect,
}

impl ChartFrame {
    /// Frame a projection: x spans the series years, y spans zero to a rounded-up maximum.
    pub fn for_projection(series: &[ProjectionPoint], viewport: Rect) -> Option<Self> {
        let first = series.first()?;
        let last = series.last()?;
        let max = series
            .iter()
            .map(|p| p.chaser_value.max(p.target_value))
            .fold(0.0f64, f64::max);
        if !max.is_finite() || max <= 0.0 {
            return None;
        }
        let x0 = f64::from(first.year);
        // A single point still needs a non-degenerate x span.
        let x1 = f64::from(last.year).max(x0 + 1.0);
        Some(Self {
            viewport,
            data: Rect::new(x0, 0.0, x1, nice_ceiling(max)),
        })
    }

    /// Frame a sparkline: both axes span the observed min/max.
    pub fn for_history(history: &[Observation], viewport: Rect) -> Option<Self> {
        let usable: Vec<Observation> = history.iter().copied().filter(|o| o.is_usable()).collect();
        if usable.len() < 2 {
            return None;
        }
        let (mut x0, mut x1) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut y0, mut y1) = (f64::INFINITY, f64::NEG_INFINITY);
        for o in &usable {
            x0 = x0.min(f64::from(o.year));
            x1 = x1.max(f64::from(o.year));
            y0 = y0.min(o.value);
            y1 = y1.max(o.value);
        }
        if x1 <= x0 {
            return None;
        }
        if y1 <= y0 {
            // Flat history: centre the line.
            y0 -= 1.0;
            y1 += 1.0;
        }
        Some(Self {
            viewport,
            data: Rect::new(x0, y0, x1, y1),
        })
    }

    /// Affine transform from data space to viewport pixels.
    pub fn transform(&self) -> Affine {
        let sx = self.viewport.width() / self.data.width();
        let sy = self.viewport.height() / self.data.height();
        Affine::new([
            sx,
            0.0,
            0.0,
            -sy,
            self.viewport.x0 - self.data.x0 * sx,
            self.viewport.y1 + self.data.y0 * sy,
        ])
    }

    /// Map one data point to pixels, rounded to 0.1 px.
    pub fn map(&self, year: f64, value: f64) -> Point {
        snap(self.transform() * Point::new(year, value))
    }

    /// Evenly spaced value ticks from the bottom to the top of the frame (inclusive).
    pub fn value_ticks(&self, count: usize) -> Vec<f64> {
        let count = count.max(2);
        (0..count)
            .map(|i| self.data.y0 + self.data.height() * i as f64 / (count - 1) as f64)
            .collect()
    }
}

/// `M`/`L` path through `points`. Empty input yields an empty string.
pub fn line_path(points: impl IntoIterator<Item = Point>) -> String {
    let mut path = BezPath::new();
    for (i, p) in points.into_iter().enumerate() {
        if i == 0 {
            path.move_to(p);
        } else {
            path.line_to(p);
        }
    }
    if path.elements().is_empty() {
        String::new()
    } else {
        path.to_svg()
    }
}

/// Chaser and target paths for a projection inside `frame`.
pub fn projection_paths(frame: &ChartFrame, series: &[ProjectionPoint]) -> (String, String) {
    let chaser = line_path(
        series
            .iter()
            .map(|p| frame.map(f64::from(p.year), p.chaser_value)),
    );
    let target = line_path(
        series
            .iter()
            .map(|p| frame.map(f64::from(p.year), p.target_value)),
    );
    (chaser, target)
}

/// Trend sparkline of usable observations, oldest first.
pub fn sparkline(history: &[Observation], viewport: Rect) -> String {
    let Some(frame) = ChartFrame::for_history(history, viewport) else {
        return String::new();
    };
    let mut usable: Vec<Observation> = history.iter().copied().filter(|o| o.is_usable()).collect();
    usable.sort_by_key(|o| o.year);
    line_path(
        usable
            .iter()
            .map(|o| frame.map(f64::from(o.year), o.value)),
    )
}

/// Smallest `{1, 2, 2.5, 5} × 10^k` at or above `v`.
fn nice_ceiling(v: f64) -> f64 {
    let exp = v.log10().floor();
    let base = 10f64.powf(exp);
    [1.0, 2.0, 2.5, 5.0, 10.0]
        .into_iter()
        .map(|m| m * base)
        .find(|&c| c >= v)
        .unwrap_or(10.0 * base)
}

fn snap(p: Point) -> Point {
    let r = |v: f64| {
        let s = (v * 10.0).round() / 10.0;
        if s == 0.0 { 0.0 } else { s }
    };
    Point::new(r(p.x), r(p.y))
}

#[cfg(test)]
#[path = "../../tests/unit/compose/chart.rs"]
mod tests;
