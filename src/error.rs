// src/error.rs

use thiserror::Error;

/// Core error types for pipext
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be constructed
    #[error("Failed to initialize: {0}")]
    InitError(String),

    /// Network-level failure or non-success HTTP status
    #[error("Download error: {0}")]
    DownloadError(String),

    /// No downloadable link satisfies a requirement
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Malformed requirement line, version, or metadata header
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Artifact extension has no archive reader
    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(String),

    /// Downloaded bytes do not match the link's digest
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Whether this failure belongs to a single requirement's fetch step.
    ///
    /// Fetch failures are always recorded and skipped, whatever the
    /// session's failure policy.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Error::DownloadError(_) | Error::ChecksumMismatch { .. })
    }
}

/// Result type alias using pipext's Error type
pub type Result<T> = std::result::Result<T, Error>;
