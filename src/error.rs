//! Error Types
//!
//! Errors only come from the non-real-time surface: parameter lookup by name,
//! configuration validation and state persistence. The audio path never
//! returns an error; it clamps, bypasses or resets instead.

use thiserror::Error;

/// Errors raised by the host/UI facing API
#[derive(Debug, Error)]
pub enum AttractorError {
    /// No parameter is registered under this name
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// A `VoiceConfig` field is out of its legal range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Saved state was written by an incompatible schema version
    #[error("unsupported state version {0}")]
    UnsupportedStateVersion(u32),

    /// JSON encoding or decoding failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used across the crate
pub type Result<T> = core::result::Result<T, AttractorError>;
