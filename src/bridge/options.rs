use crate::foundation::core::Rgb8;

/// How the SVG is scaled onto the output pixmap.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "camelCase")]
pub enum FitTo {
    /// Intrinsic SVG size.
    #[default]
    Original,
    /// Scale to this width, keeping the aspect ratio.
    Width(u32),
    /// Scale to this height, keeping the aspect ratio.
    Height(u32),
    /// Scale by this factor.
    Zoom(f32),
}

/// Font settings for text in the SVG.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FontOptions {
    /// Family used when the document's family is not installed.
    pub default_family: Option<String>,
}

/// Per-render options, passed to the rasterizer as a JSON blob.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Output scaling.
    pub fit_to: FitTo,
    /// Opaque background; transparent when absent.
    pub background: Option<Rgb8>,
    /// Font overrides.
    pub font: FontOptions,
}
