//! Error types for scriptloom-codegen

use thiserror::Error;

/// Result type alias for scriptloom-codegen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during code generation
#[derive(Error, Debug)]
pub enum Error {
    /// Graph loading or normalization failed
    #[error(transparent)]
    Core(#[from] scriptloom_core::Error),

    /// A plan step's key has no registered builder
    ///
    /// The normalizer validates against the registry, so this only fires
    /// when a plan is compiled against a different registry than it was
    /// normalized with.
    #[error("no builder registered for '{key}'")]
    UnknownOperation {
        /// The unresolved registry key
        key: String,
    },

    /// JSON serialization error (manifest emission)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
