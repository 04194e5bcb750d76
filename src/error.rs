//! Error type shared by every gateway.
//!
//! The variants mirror how failures are handled: configuration and
//! validation problems are reported before any network call, backend
//! failures carry the HTTP status and the Google RPC status code so the
//! search gateway can classify them.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A referenced local resource (e.g. a key file) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A domain value failed validation at construction.
    #[error("validation error: {0}")]
    Validation(String),

    /// The remote service answered with an error.
    #[error("{service} error (HTTP {status}, {code}): {message}")]
    Backend {
        service: &'static str,
        status: u16,
        /// Google RPC status name, e.g. `INVALID_ARGUMENT`. Empty when absent.
        code: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// True for `INVALID_ARGUMENT`-class backend failures.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            Error::Backend { status, code, .. } => *status == 400 || code == "INVALID_ARGUMENT",
            _ => false,
        }
    }
}
