// src/error.rs

//! Unified error handling for the relay.

use std::fmt;

use thiserror::Error;

use crate::query::QueryError;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Subscription query could not be compiled
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote fetch error
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// Read model (subscriptions, users, cursor) error
    #[error("Read model error: {0}")]
    ReadModel(String),

    /// A single file can never fit in the staging quota
    #[error("File of {size} bytes does not fit the {max} byte staging quota")]
    FileTooLarge { size: u64, max: u64 },

    /// No staging space became free in time
    #[error("Staging quota exhausted: {size} bytes could not be reserved")]
    QuotaExhausted { size: u64 },

    /// Media conversion failed
    #[error("Transcode error: {0}")]
    Transcode(String),

    /// Another cycle holds the single-flight gate
    #[error("A sync cycle is already in progress")]
    CycleInProgress,

    /// The cycle did not finish before its deadline
    #[error("Sync cycle exceeded its {secs}s deadline")]
    CycleDeadline { secs: u64 },
}

impl AppError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a read model error.
    pub fn read_model(message: impl fmt::Display) -> Self {
        Self::ReadModel(message.to_string())
    }

    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }
}
