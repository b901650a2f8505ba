//! Error types for the similarity pipeline.

/// Errors surfaced by configuration, I/O collaborators, and index construction.
///
/// Only fatal conditions live here. Insufficient data and "no candidates" are
/// reported through [`crate::pipeline::RunStatus`], not as errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration value is outside its valid domain.
    #[error("invalid configuration: {name} = {value} ({reason})")]
    InvalidConfig {
        /// Name of the offending field.
        name: &'static str,
        /// The rejected value, rendered for display.
        value: String,
        /// What the valid domain is.
        reason: &'static str,
    },
    /// The configured identifier column does not exist in the item source.
    #[error("identifier column `{column}` not found in item source (available: {available:?})")]
    MissingIdColumn {
        /// Configured identifier column.
        column: String,
        /// Columns the source does expose.
        available: Vec<String>,
    },
    /// Projection width does not match the feature dimension.
    #[error("dimension mismatch (expected {expected}, got {got})")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual provided dimension.
        got: usize,
    },
    /// Reading items or writing results failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// An input line is not a JSON object.
    #[error("malformed record at line {line}: {source}")]
    Json {
        /// 1-based line number in the input.
        line: usize,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Serializing an output record failed.
    #[error("failed to encode result record: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Error::InvalidConfig {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
