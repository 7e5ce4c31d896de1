//! Error types for the railnet toolkit
//!
//! Library crates return [`Result`] and convert their own seam errors into
//! [`Error`] when they cross into a graph-wide failure.

use thiserror::Error;

/// Main error type for railnet operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed track or station data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input file could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Graph construction failed
    #[error("Graph build failed: {0}")]
    Build(String),

    /// Distance scaling could not be derived from the station set
    #[error("Calibration failed: {0}")]
    Calibration(String),
}

/// Result type alias for railnet operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error was caused by the data handed in rather than by the
    /// system itself
    pub fn is_input_defect(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::Parse(_))
    }
}
