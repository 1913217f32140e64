//! Time-to-convergence arithmetic and bounded projection series.

/// Historical CAGR fallback.
pub mod cagr;
/// Convergence solver and series generation.
pub mod engine;

pub use cagr::{DEFAULT_FALLBACK_CAGR, GrowthSource, ResolvedGrowth, historical_cagr, resolve_growth};
pub use engine::{
    Convergence, MAX_PROJECTION_YEARS, Milestone, Outcome, ProjectionOpts, ProjectionPoint,
    project_and_converge, required_growth_rate, years_to_converge,
};
