//! Error types for Turnstile.

use thiserror::Error;

/// Main error type for pipeline and rate limiting operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Admission denied: the caller's bucket held fewer than one token.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The credential was rejected by the validator
    #[error("unauthorized")]
    Unauthorized,

    /// The credential did not carry the expected scheme
    #[error("invalid token")]
    InvalidToken,

    /// No credential was supplied
    #[error("missing authorization token")]
    MissingToken,

    /// A handler panicked and the panic was recovered.
    #[error("internal server error")]
    Panic,

    /// The context deadline elapsed before the backend answered.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("backend not found: {0}")]
    BackendNotFound(String),

    /// Failure reported by a backend implementation
    #[error("backend error: {0}")]
    Backend(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is an admission rejection from the rate limiter.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited)
    }

    /// The HTTP-style status a protocol adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RateLimited => 429,
            Error::Unauthorized | Error::InvalidToken | Error::MissingToken => 401,
            Error::DeadlineExceeded => 504,
            Error::ServiceNotFound(_) | Error::MethodNotFound(_) => 404,
            _ => 500,
        }
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, Error>;
