//! Error types for server API calls.
//!
//! HTTP failures keep their status code so callers can tell transient
//! failures (5xx, 429, transport) from permanent ones.

/// Result type alias for server API calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if the server answered.
        status: Option<u16>,
    },

    /// Invalid response body.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// No account configured for the server.
    #[error("no user configured for {0}")]
    MissingCredentials(String),
}

impl Error {
    /// HTTP status code, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a later attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status: None, .. } => true,
            Self::Http {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            Self::InvalidResponse(_) | Self::MissingCredentials(_) => false,
        }
    }

    /// Convert into the engine's connection error for `server`.
    pub fn into_connection(self, server: &str) -> reconcile::Error {
        reconcile::Error::Connection {
            server: server.to_string(),
            retryable: self.is_retryable(),
            message: match self.status() {
                Some(401 | 403) => format!("authentication rejected ({self})"),
                _ => self.to_string(),
            },
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
