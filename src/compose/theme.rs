use crate::foundation::core::Rgb8;

/// Card palette.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Theme {
    /// Stable name, used in the query (`theme=dark`).
    pub name: &'static str,
    /// Canvas fill.
    pub background: Rgb8,
    /// Panel fill.
    pub surface: Rgb8,
    /// Primary text.
    pub text: Rgb8,
    /// Secondary text and axis labels.
    pub muted: Rgb8,
    /// Grid lines and separators.
    pub grid: Rgb8,
    /// Chaser series.
    pub chaser: Rgb8,
    /// Target series.
    pub target: Rgb8,
    /// Convergence marker and milestones.
    pub accent: Rgb8,
}

impl Theme {
    /// Light palette (default).
    pub fn light() -> Self {
        Self {
            name: "light",
            background: Rgb8::new(0xf7, 0xf5, 0xf0),
            surface: Rgb8::new(0xff, 0xff, 0xff),
            text: Rgb8::new(0x1b, 0x1f, 0x2a),
            muted: Rgb8::new(0x6b, 0x72, 0x80),
            grid: Rgb8::new(0xe3, 0xe0, 0xd8),
            chaser: Rgb8::new(0xe0, 0x5a, 0x2b),
            target: Rgb8::new(0x25, 0x63, 0xeb),
            accent: Rgb8::new(0x0f, 0x9d, 0x58),
        }
    }

    /// Dark palette.
    pub fn dark() -> Self {
        Self {
            name: "dark",
            background: Rgb8::new(0x12, 0x14, 0x1c),
            surface: Rgb8::new(0x1d, 0x21, 0x2c),
            text: Rgb8::new(0xf1, 0xf3, 0xf7),
            muted: Rgb8::new(0x9a, 0xa3, 0xb5),
            grid: Rgb8::new(0x2e, 0x34, 0x42),
            chaser: Rgb8::new(0xff, 0x8a, 0x4c),
            target: Rgb8::new(0x6c, 0x9c, 0xff),
            accent: Rgb8::new(0x3d, 0xd6, 0x8c),
        }
    }

    /// Look a palette up by name (case-insensitive).
    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Self::light()),
            "dark" => Some(Self::dark()),
            _ => None,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::light()
    }
}
