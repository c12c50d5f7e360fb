use thiserror::Error;

use crate::cache::StorageError;

/// Validation and contract errors exposed by `thera-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("gene symbol cannot be empty")]
    EmptyGeneSymbol,
    #[error("gene symbol length {len} exceeds max {max}")]
    GeneSymbolTooLong { len: usize, max: usize },
    #[error("gene symbol must start with an ASCII letter: '{ch}'")]
    GeneSymbolInvalidStart { ch: char },
    #[error("gene symbol contains invalid character '{ch}' at index {index}")]
    GeneSymbolInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("minimum IC50 {min} nM exceeds maximum {max} nM")]
    InvertedPotencyRange { min: f64, max: f64 },

    #[error("query names no gene symbols")]
    EmptyQuery,
    #[error("disease query requires a configured disease mapper")]
    MissingDiseaseMapper,

    #[error("setting {name} has invalid value '{value}'")]
    InvalidSetting { name: &'static str, value: String },
}

/// A single upstream record that could not be mapped into the normalized model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("record is missing required field '{field}'")]
    MissingField { field: &'static str },
    #[error("unrecognised concentration unit '{unit}'")]
    UnknownUnit { unit: String },
    #[error("field '{field}' holds a non-numeric value '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("malformed XML document: {0}")]
    Xml(String),
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("collaborator failed: {0}")]
    Collaborator(String),
}
