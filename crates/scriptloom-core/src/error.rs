//! Error types for scriptloom-core

use thiserror::Error;

/// Result type alias for scriptloom-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or normalizing a graph
///
/// All compile-time failures are fatal: no partial bundle is produced.
#[derive(Error, Debug)]
pub enum Error {
    /// A node references an operation the catalog does not know
    #[error("unsupported operation '{key}' on node '{node_id}'")]
    UnsupportedOperation {
        /// Id of the offending node
        node_id: String,
        /// Registry key that failed to resolve
        key: String,
    },

    /// A trigger's walk revisited a node it had already emitted
    #[error("cycle detected at node '{node_id}'")]
    CycleDetected {
        /// Id of the node that was revisited
        node_id: String,
    },

    /// A node is missing a required field, or node ids collide
    #[error("malformed graph at node '{node_id}': {message}")]
    MalformedGraph {
        /// Id of the offending node ("<unknown>" when the id itself is missing)
        node_id: String,
        /// Description of what's wrong
        message: String,
    },

    /// An edge references a node id that does not exist
    #[error("edge references unknown node '{node_id}'")]
    UnknownEdgeTarget {
        /// The missing node id
        node_id: String,
    },

    /// Graph document could not be found
    #[error("graph document not found: {path}")]
    GraphNotFound {
        /// Path that was searched
        path: String,
    },

    /// Graph document has an extension other than .json/.yaml/.yml
    #[error("unsupported graph document format: {path}")]
    UnsupportedFormat {
        /// Path of the document
        path: String,
    },

    /// Failed to parse a JSON graph document
    #[error("failed to parse graph: {0}")]
    GraphParseJson(#[from] serde_json::Error),

    /// Failed to parse a YAML graph document
    #[error("failed to parse graph: {0}")]
    GraphParseYaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
