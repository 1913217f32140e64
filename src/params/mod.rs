//! Comparison parameters and their canonical URL form.

/// Query-string codec.
pub mod codec;
/// Raw query splitting.
pub mod query;
/// Typed comparison state.
pub mod state;

pub use codec::{decode, decode_pairs, encode};
pub use state::{
    ComparisonState, EntityCode, MetricCode, RegionCode, Scope, TargetMode, ViewMode,
};
