//! Error types for statement execution.

use graphsync_core::SchemaError;
use thiserror::Error;

/// Main error type for graph operations.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Configuration or data error raised before anything was sent to the store.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("Failed to read column '{column}': {reason}")]
    Deserialize { column: String, reason: String },

    #[error("Graph store error: {0}")]
    Store(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Cleanup statement '{statement}' still deleted rows after {iterations} iterations")]
    CleanupDidNotConverge { statement: String, iterations: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

impl GraphError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// True when the error was raised before any statement reached the store.
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }
}
