//! Error types for starmesh

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("peer rejected request: status {status}")]
    PeerRejected { status: u16 },

    #[error("broadcast payload too large: {0} bytes (max 1024)")]
    PayloadTooLarge(usize),

    // === Serialization ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Fatal ===
    /// Authoritative rejection or unrecoverable loss of membership. The
    /// top-level run loop maps this to an orderly shutdown with a non-zero
    /// exit status.
    #[error("fatal: {0}")]
    Fatal(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Does this error terminate the node?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Error::Fatal(msg.into())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

/// Protocol-level rejection of a control-plane request.
///
/// The HTTP status codes are protocol signals, not just REST convention:
/// peers key their own behavior (terminate, retry, skip) off the exact code,
/// so the mapping here must stay stable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Node has not finished discovery yet.
    #[error("503 service unavailable")]
    Unavailable,
    /// A required identifier is missing from the request.
    #[error("400 bad request")]
    BadRequest,
    /// Identity or caller-address mismatch.
    #[error("401 unauthorized")]
    Unauthorized,
    /// Member capacity exhausted.
    #[error("403 no room left")]
    NoRoom,
    /// Unknown identifier.
    #[error("404 does not exist")]
    NotFound,
    /// Duplicate or conflicting state.
    #[error("409 conflict")]
    Conflict,
    /// Payload failed field validation.
    #[error("412 precondition failed")]
    PreconditionFailed,
    /// Downstream relay failed.
    #[error("500 internal server error")]
    Internal,
}

impl Rejection {
    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Rejection::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Rejection::BadRequest => StatusCode::BAD_REQUEST,
            Rejection::Unauthorized => StatusCode::UNAUTHORIZED,
            Rejection::NoRoom => StatusCode::FORBIDDEN,
            Rejection::NotFound => StatusCode::NOT_FOUND,
            Rejection::Conflict => StatusCode::CONFLICT,
            Rejection::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Rejection::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a peer's HTTP status back into a rejection, for verbatim
    /// forwarding of coordinator decisions to the original caller.
    pub fn from_status(status: u16) -> Self {
        match status {
            503 => Rejection::Unavailable,
            400 => Rejection::BadRequest,
            401 => Rejection::Unauthorized,
            403 => Rejection::NoRoom,
            404 => Rejection::NotFound,
            409 => Rejection::Conflict,
            412 => Rejection::PreconditionFailed,
            _ => Rejection::Internal,
        }
    }
}

impl axum::response::IntoResponse for Rejection {
    fn into_response(self) -> axum::response::Response {
        (self.http_status(), self.to_string()).into_response()
    }
}
