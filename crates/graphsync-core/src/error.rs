//! Centralized error types for schema declaration and record resolution.

use thiserror::Error;

/// Main error type for schema and record handling.
///
/// Variants fall into three groups: configuration errors (the schema or the
/// batch parameters are wrong), data errors (an input record is wrong), and
/// file errors (a schema file could not be read).
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid schema '{schema}': {reason}")]
    InvalidSchema { schema: String, reason: String },

    #[error("Schema '{schema}' references batch parameter '{name}' which was not supplied")]
    MissingParameter { schema: String, name: String },

    #[error("Batch parameter '{name}' has an unsupported value: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Record {index} for schema '{schema}' is missing required field '{field}'")]
    MissingField {
        schema: String,
        index: usize,
        field: String,
    },

    #[error("Record {index} for schema '{schema}' has an unsupported value in '{field}': {reason}")]
    InvalidValue {
        schema: String,
        index: usize,
        field: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

impl SchemaError {
    /// Create an invalid schema error.
    pub fn invalid(schema: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            schema: schema.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the schema declaration or the batch parameters.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidSchema { .. }
                | Self::MissingParameter { .. }
                | Self::InvalidParameter { .. }
        )
    }

    /// True for errors caused by the content of an input record.
    pub fn is_data(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::InvalidValue { .. })
    }
}
