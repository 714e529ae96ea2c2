//! Error types for the cache server
//!
//! Provides unified error handling using thiserror. Each kind maps to exactly
//! one HTTP status; bodies are plain text to stay wire compatible with qcache
//! clients.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::frame::FrameError;

// == Error Enum ==
/// Unified error type for the cache server.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed headers, body or query
    #[error("{0}")]
    BadRequest(String),

    /// Unknown dataset key
    #[error("Dataset '{0}' not found")]
    NotFound(String),

    /// Basic auth mismatch
    #[error("Unauthorised")]
    Unauthorised,

    /// Entry larger than the whole cache capacity
    #[error("cannot fit {0} bytes in cache")]
    TooLarge(usize),

    /// LZ4 decode failure or content-length inconsistency
    #[error("{0}")]
    Codec(String),

    /// Unrecovered panic, surfaced with a stack hash
    #[error("Internal server error {0}")]
    Internal(u64),
}

impl Error {
    /// Shorthand for a formatted `BadRequest`.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Error::BadRequest(msg.into())
    }
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        Error::BadRequest(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::BadRequest(_) | Error::TooLarge(_) | Error::Codec(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorised => StatusCode::UNAUTHORIZED,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if let Error::Unauthorised = self {
            return (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"framecache\"")],
                self.to_string(),
            )
                .into_response();
        }

        (status, self.to_string()).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, Error>;
