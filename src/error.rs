//! Error types for chapter-dl
//!
//! This module provides the library-wide error type, including:
//! - Transfer errors (network, HTTP status, interrupted bodies) that feed the retry policy
//! - Rendering context and auxiliary context failures
//! - Configuration validation errors with the offending key
//! - Machine-readable error codes for events and logs

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for chapter-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chapter-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency_limit")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote server answered with a non-success status
    #[error("HTTP {status} while fetching {url}")]
    HttpStatus {
        /// The URL that was requested
        url: String,
        /// HTTP status code returned by the server
        status: u16,
    },

    /// Transfer was interrupted or aborted by the transfer subsystem
    #[error("transfer interrupted for {source_location}: {reason}")]
    Transfer {
        /// Where the asset was being fetched from
        source_location: String,
        /// Reason reported by the transfer subsystem
        reason: String,
    },

    /// Archive encoding failed
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Image could not be decoded
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rendering context could not be created or queried
    #[error("rendering context error: {0}")]
    Context(String),

    /// Auxiliary (document rendering) context could not be created or failed to render
    #[error("auxiliary context error: {0}")]
    AuxiliaryContext(String),

    /// Rendering never produced any content before the deadline
    #[error("rendering abandoned: {0}")]
    Abandoned(String),

    /// Output path is not usable
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The rejected path
        path: PathBuf,
        /// Why the path was rejected
        reason: String,
    },

    /// Referenced job (or other entity) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Settings file watching error
    #[error("settings watch error: {0}")]
    Watch(String),
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::HttpStatus { .. } => "http_status",
            Error::Transfer { .. } => "transfer_interrupted",
            Error::Archive(_) => "archive_error",
            Error::Image(_) => "image_error",
            Error::Serialization(_) => "serialization_error",
            Error::Context(_) => "context_error",
            Error::AuxiliaryContext(_) => "auxiliary_context_error",
            Error::Abandoned(_) => "abandoned",
            Error::InvalidPath { .. } => "invalid_path",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Watch(_) => "watch_error",
        }
    }

    /// Shorthand for a configuration error on a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
