//! Error types for the HTTP layer.

use thiserror::Error;

/// Result type for HTTP operations.
pub type HttpResult<T> = Result<T, HttpError>;

/// Errors raised while serving or calling the remoting endpoint.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Binding or serving the listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
