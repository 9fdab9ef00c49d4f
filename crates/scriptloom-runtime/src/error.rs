//! Error types for scriptloom-runtime

use thiserror::Error;

/// Result type alias for scriptloom-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the runtime semantics
///
/// Missing-secret failures are deliberately non-fatal at the step level:
/// callers log a warning and return the context unmodified. Sealing
/// failures are always fatal.
#[derive(Error, Debug)]
pub enum Error {
    /// A required field is missing or invalid, detected before any network call
    #[error("validation failed in step '{step}', field '{field}': {message}")]
    Validation {
        /// Step function name
        step: String,
        /// Offending field
        field: String,
        /// Description of the problem
        message: String,
    },

    /// No candidate key resolved to a secret
    #[error("missing secret '{name}' (tried: {})", .tried.join(", "))]
    MissingSecret {
        /// The requested secret name
        name: String,
        /// Every candidate key that was tried, in order
        tried: Vec<String>,
    },

    /// OAuth token lookup failed, rewritten into an actionable message
    #[error(
        "connector '{connector}' has no OAuth token: set script property '{property}' \
         (or one of: {}) with scopes [{}]",
        .aliases.join(", "),
        .scopes.join(", ")
    )]
    MissingOAuthToken {
        /// Connector key, e.g. `slack`
        connector: String,
        /// Canonical property name
        property: String,
        /// Accepted alias property names
        aliases: Vec<String>,
        /// OAuth scopes the token must carry
        scopes: Vec<String>,
    },

    /// Sealed token envelope could not be parsed
    #[error("sealed token malformed: {message}")]
    SealFormat {
        /// Description of the parse failure
        message: String,
    },

    /// Sealed token carries a version this codec does not know
    #[error("sealed token version {version} is not supported")]
    SealUnknownVersion {
        /// The unknown version
        version: u32,
    },

    /// Sealed token is past its expiry
    #[error("sealed token expired at {expires_at}")]
    SealExpired {
        /// Expiry in epoch milliseconds
        expires_at: i64,
    },

    /// Authentication tag mismatch, or inner metadata disagrees with the envelope
    #[error("sealed token failed integrity check")]
    Integrity,

    /// A permanent HTTP failure, surfaced immediately
    #[error("HTTP {status} from {url}: {message}")]
    Http {
        /// Response status
        status: u16,
        /// Request URL
        url: String,
        /// Flattened error-body message
        message: String,
        /// Raw response body
        body: String,
    },

    /// Every retry attempt failed
    #[error("retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Status of the last response, if any
        status: Option<u16>,
        /// Body of the last response, if any
        body: String,
        /// Description of the last failure
        message: String,
    },

    /// Transport-level failure with no HTTP response
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
    },

    /// Trigger host refused an operation
    #[error("trigger error: {message}")]
    Trigger {
        /// Description of the failure
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
