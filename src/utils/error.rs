//! Error Handling Module
//!
//! Defines custom error types for the CultureScreen library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for CultureScreen operations
#[derive(Error, Debug)]
pub enum CultureError {
    /// No labels available where at least one is required
    #[error("Empty dataset: no labels to count")]
    EmptyDataset,

    /// A monitor-based callback was configured but no validation split exists
    #[error("No validation signal: '{0}' is monitored but the validation split is empty")]
    NoValidationSignal(String),

    /// Best-epoch estimation was asked for but the run recorded zero epochs
    #[error("No training history: best-epoch estimation requires at least one recorded epoch")]
    NoTrainingHistory,

    /// Error loading or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model operations (weight persistence, construction)
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Error during hyperparameter search
    #[error("Search error: {0}")]
    Search(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Convenience Result type for CultureScreen operations
pub type Result<T> = std::result::Result<T, CultureError>;
