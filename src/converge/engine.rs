use crate::params::state::{DEFAULT_YEARS, MAX_YEARS};

/// Hard cap on projected years. Bounds the stepping loop when convergence is far away or never.
pub const MAX_PROJECTION_YEARS: u32 = MAX_YEARS;

/// Chaser/target ratios reported as milestones.
pub const MILESTONE_RATIOS: [f64; 3] = [0.5, 0.75, 0.9];

/// One projected year.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ProjectionPoint {
    /// Calendar year.
    pub year: i32,
    /// Projected chaser value.
    pub chaser_value: f64,
    /// Projected target value.
    pub target_value: f64,
}

/// Series generation knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProjectionOpts {
    /// Years between consecutive points.
    pub stride_years: u32,
    /// Extra years allowed past `ceil(n)` before the loop gives up.
    pub buffer_years: u32,
    /// Span projected when there is no finite convergence.
    pub horizon_years: u32,
    /// Goal span used for the required-growth figure.
    pub goal_years: u32,
    /// Longer series are decimated down to this many points.
    pub max_points: usize,
}

impl Default for ProjectionOpts {
    fn default() -> Self {
        Self {
            stride_years: 1,
            buffer_years: 5,
            horizon_years: DEFAULT_YEARS,
            goal_years: DEFAULT_YEARS,
            max_points: 50,
        }
    }
}

impl ProjectionOpts {
    /// Five-year stride used by the compact summary card.
    pub fn summary() -> Self {
        Self {
            stride_years: 5,
            ..Self::default()
        }
    }
}

/// Year at which the chaser reaches `ratio` of the target.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct Milestone {
    /// Chaser/target ratio, e.g. `0.5`.
    pub ratio: f64,
    /// First calendar year at or past the ratio.
    pub year: i32,
}

/// Headline classification of a [`Convergence`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Outcome {
    /// The chaser already meets or exceeds the target in the base year.
    AlreadyAhead,
    /// The chaser catches up after `years` (fractional), in calendar `year`.
    Converges {
        /// Fractional years until convergence.
        years: f64,
        /// Rounded calendar year of convergence.
        year: i32,
    },
    /// The chaser never catches up under the assumed rates.
    Never,
}

/// Result of [`project_and_converge`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Convergence {
    /// `0.0`, a finite positive number of years, or `f64::INFINITY`.
    pub years_to_converge: f64,
    /// `round(base_year + years_to_converge)` when finite.
    pub convergence_year: Option<i32>,
    /// Projected trajectories, strictly increasing in `year`, at most 151 points.
    pub series: Vec<ProjectionPoint>,
    /// Chaser rate needed to catch up within `goal_years`.
    pub required_growth: Option<f64>,
    /// Reachable milestone years, in ratio order.
    pub milestones: Vec<Milestone>,
}

impl Convergence {
    /// Classify the result.
    pub fn outcome(&self) -> Outcome {
        match self.convergence_year {
            _ if self.years_to_converge == 0.0 => Outcome::AlreadyAhead,
            Some(year) => Outcome::Converges {
                years: self.years_to_converge,
                year,
            },
            None => Outcome::Never,
        }
    }
}

/// Solve `c·(1+cr)^n = t·(1+tr)^n` for `n`.
///
/// Returns `0.0` when the chaser is already ahead and `f64::INFINITY` when `cr <= tr`. Inputs must
/// already be validated (positive finite values, rates above `-1`).
pub fn years_to_converge(chaser: f64, target: f64, chaser_rate: f64, target_rate: f64) -> f64 {
    if chaser >= target {
        return 0.0;
    }
    if chaser_rate <= target_rate {
        return f64::INFINITY;
    }
    let n = (target / chaser).ln() / ((1.0 + chaser_rate) / (1.0 + target_rate)).ln();
    if n.is_finite() && n >= 0.0 {
        n
    } else {
        f64::INFINITY
    }
}

/// Project both trajectories from `base_year` and find where they cross.
///
/// Returns `None` when the inputs cannot take part in growth arithmetic (non-finite or
/// non-positive values, rates at or below `-100%`); callers treat that as "no data".
pub fn project_and_converge(
    chaser_value: f64,
    target_value: f64,
    chaser_rate: f64,
    target_rate: f64,
    base_year: i32,
    opts: ProjectionOpts,
) -> Option<Convergence> {
    let usable = |v: f64| v.is_finite() && v > 0.0;
    let usable_rate = |r: f64| r.is_finite() && r > -1.0;
    if !usable(chaser_value)
        || !usable(target_value)
        || !usable_rate(chaser_rate)
        || !usable_rate(target_rate)
    {
        return None;
    }

    let years = years_to_converge(chaser_value, target_value, chaser_rate, target_rate);
    let convergence_year = years
        .is_finite()
        .then(|| base_year.saturating_add(years.round() as i32));

    let limit = if years.is_finite() {
        (years.ceil() as u32)
            .saturating_add(opts.buffer_years)
            .min(MAX_PROJECTION_YEARS)
    } else {
        opts.horizon_years.min(MAX_PROJECTION_YEARS)
    };

    let stride = opts.stride_years.max(1);
    let mut series = Vec::with_capacity((limit / stride) as usize + 2);
    let mut offset = 0u32;
    loop {
        let point = ProjectionPoint {
            year: base_year.saturating_add(offset as i32),
            chaser_value: chaser_value * (1.0 + chaser_rate).powi(offset as i32),
            target_value: target_value * (1.0 + target_rate).powi(offset as i32),
        };
        series.push(point);
        if point.chaser_value >= point.target_value || offset >= limit {
            break;
        }
        offset = offset.saturating_add(stride).min(limit);
    }

    Some(Convergence {
        years_to_converge: years,
        convergence_year,
        series: decimate(series, opts.max_points),
        required_growth: required_growth_rate(
            chaser_value,
            target_value,
            target_rate,
            opts.goal_years,
        ),
        milestones: milestones(chaser_value, target_value, chaser_rate, target_rate, base_year),
    })
}

/// Annual chaser rate needed to meet the target after `goal_years`, given the target's rate.
pub fn required_growth_rate(
    chaser: f64,
    target: f64,
    target_rate: f64,
    goal_years: u32,
) -> Option<f64> {
    if goal_years == 0 || !(chaser > 0.0 && target > 0.0) || target_rate <= -1.0 {
        return None;
    }
    let rate = (1.0 + target_rate) * (target / chaser).powf(1.0 / f64::from(goal_years)) - 1.0;
    rate.is_finite().then_some(rate)
}

fn milestones(
    chaser: f64,
    target: f64,
    chaser_rate: f64,
    target_rate: f64,
    base_year: i32,
) -> Vec<Milestone> {
    if chaser_rate <= target_rate {
        return Vec::new();
    }
    let per_year = ((1.0 + chaser_rate) / (1.0 + target_rate)).ln();
    MILESTONE_RATIOS
        .iter()
        .filter(|&&ratio| chaser / target < ratio)
        .filter_map(|&ratio| {
            let n = (ratio * target / chaser).ln() / per_year;
            (n.is_finite() && n <= f64::from(MAX_PROJECTION_YEARS)).then(|| Milestone {
                ratio,
                year: base_year.saturating_add(n.ceil() as i32),
            })
        })
        .collect()
}

/// Keep at most `max_points` points, always retaining the first and the last.
fn decimate(series: Vec<ProjectionPoint>, max_points: usize) -> Vec<ProjectionPoint> {
    let max_points = max_points.max(2);
    let len = series.len();
    if len <= max_points {
        return series;
    }
    (0..max_points)
        .map(|i| series[i * (len - 1) / (max_points - 1)])
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/converge/engine.rs"]
mod tests;
