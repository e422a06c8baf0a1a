//! Error types for directory operations.

use ldap3::LdapError;

/// Result type alias for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// LDAP result code for a missing entry.
const NO_SUCH_OBJECT: u32 = 32;

/// LDAP result code for bad credentials.
const INVALID_CREDENTIALS: u32 = 49;

/// Errors that can occur while talking to the directory.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration is incomplete.
    #[error("invalid directory configuration: {0}")]
    Config(String),

    /// Could not open a connection.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Directory URL.
        url: String,
        /// Underlying error.
        #[source]
        source: LdapError,
    },

    /// Bind was rejected.
    #[error("bind failed for {dn}: {message}")]
    Bind {
        /// Bind DN.
        dn: String,
        /// Server message.
        message: String,
    },

    /// A search failed.
    #[error("search under {base} failed: {source}")]
    Search {
        /// Search base.
        base: String,
        /// Underlying error.
        #[source]
        source: LdapError,
    },

    /// No entry for the group.
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// The group name matched several entries.
    #[error("group name {group} matches {count} entries")]
    AmbiguousGroup {
        /// Group name.
        group: String,
        /// Number of matches.
        count: usize,
    },

    /// No entry for the user.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// A member value could not be mapped to a user id.
    #[error("cannot derive a user id from {0}")]
    InvalidDn(String),
}

impl Error {
    /// Wrap a search failure, turning "no such object" into a typed error.
    pub fn search(base: &str, source: LdapError, missing: impl FnOnce() -> Self) -> Self {
        match &source {
            LdapError::LdapResult { result } if result.rc == NO_SUCH_OBJECT => missing(),
            _ => Self::Search {
                base: base.to_string(),
                source,
            },
        }
    }

    /// Wrap a bind failure.
    pub fn bind(dn: &str, source: &LdapError) -> Self {
        let message = match source {
            LdapError::LdapResult { result } if result.rc == INVALID_CREDENTIALS => {
                "invalid credentials".to_string()
            }
            other => other.to_string(),
        };
        Self::Bind {
            dn: dn.to_string(),
            message,
        }
    }
}
