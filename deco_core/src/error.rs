//! Error types for the deco_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for deco_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dive plan rejected before any computation
    #[error("Invalid dive plan: {0}")]
    InvalidPlan(String),

    /// The requested profile cannot be decompressed with the current settings
    #[error("Infeasible decompression at {depth} m: {reason}")]
    Infeasible { depth: f64, reason: String },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn infeasible(depth: f64, reason: impl Into<String>) -> Self {
        Error::Infeasible {
            depth,
            reason: reason.into(),
        }
    }
}
