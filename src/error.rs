//! Error types for the scrna-prep library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum PrepError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid count value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A filter removed every row or column.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A statistic needed downstream is undefined (zero mean, zero MAD, zero size factor).
    #[error("Degenerate statistic: {0}")]
    DegenerateStatistic(String),

    #[error("Requested {requested} genes but only {available} survive filtering")]
    InsufficientFeatures { requested: usize, available: usize },

    #[error("Median library size is zero, cannot compute size factors")]
    ZeroMedian,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, PrepError>;
