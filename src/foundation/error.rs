/// Convenience result alias used across the crate.
pub type CardResult<T> = Result<T, CardError>;

/// Errors produced by the card pipeline and the render bridge.
///
/// Parameter problems never surface here: the codec normalizes them to defaults. What remains are
/// configuration problems, render-bridge lifecycle violations, and faults reported across the
/// rasterizer boundary.
#[derive(thiserror::Error, Debug)]
pub enum CardError {
    /// Invalid configuration or caller input that cannot be normalized.
    #[error("validation error: {0}")]
    Validation(String),

    /// A render was attempted before the rasterizer module finished initializing.
    #[error("render module not initialized")]
    NotInitialized,

    /// The rasterizer module was initialized twice.
    #[error("render module already initialized")]
    AlreadyInitialized,

    /// Unrecoverable guest fault (out-of-bounds access, out of memory, corrupted stack).
    #[error("guest trap: {0}")]
    GuestTrap(String),

    /// Recoverable error reported by the rasterizer through its error slot.
    #[error("rasterizer error: {0}")]
    Guest(String),

    /// A value could not be moved across the boundary (bad pointer/length, invalid UTF-8).
    #[error("marshal error: {0}")]
    Marshal(String),

    /// A heap-table handle was used after its slot had been released.
    #[error("stale heap handle {index} (generation {generation})")]
    StaleHandle {
        /// Slot index encoded in the handle.
        index: u32,
        /// Generation encoded in the handle.
        generation: u32,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Anything else, usually I/O with attached context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CardError {
    /// Build a [`CardError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`CardError::GuestTrap`].
    pub fn trap(msg: impl Into<String>) -> Self {
        Self::GuestTrap(msg.into())
    }

    /// Build a [`CardError::Guest`].
    pub fn guest(msg: impl Into<String>) -> Self {
        Self::Guest(msg.into())
    }

    /// Build a [`CardError::Marshal`].
    pub fn marshal(msg: impl Into<String>) -> Self {
        Self::Marshal(msg.into())
    }

    /// Short machine-readable label, used for the fallback response header and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotInitialized => "not-initialized",
            Self::AlreadyInitialized => "already-initialized",
            Self::GuestTrap(_) => "guest-trap",
            Self::Guest(_) => "rasterizer",
            Self::Marshal(_) => "marshal",
            Self::StaleHandle { .. } => "stale-handle",
            Self::Serde(_) => "serde",
            Self::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for CardError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
