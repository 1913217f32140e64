//! SVG share-card composition.
//!
//! Everything here is a pure function of its inputs; the rendered bytes feed the response
//! fingerprint, so output must not depend on anything but the arguments.

/// Card layout and `compose_svg`.
pub mod card;
/// Data-to-viewport mapping and path strings.
pub mod chart;
/// Text escaping and number formatting.
pub mod format;
/// Color palettes.
pub mod theme;

pub use card::{
    RenderDocument, ResolvedNames, ResolvedValues, UNAVAILABLE_HEADLINE, compose_svg,
};
pub use theme::Theme;
