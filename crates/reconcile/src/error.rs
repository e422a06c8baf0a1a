//! Error types for reconciliation.
//!
//! Errors are categorized so the orchestrator can decide what to retry,
//! what aborts a single construct, and what only marks one identity as
//! failed. Every variant carries plain strings so errors can be cloned into
//! reports and serialized.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::types::{Action, Construct, Identity};

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Directory unreachable or query rejected
    Directory,
    /// Target server state could not be read
    Server,
    /// A single grant or revoke was rejected
    Rejected,
    /// License pool has no seats left
    Capacity,
    /// Destructive change refused
    Safety,
    /// Connection-level failure (possibly transient)
    Network,
    /// Invalid or incomplete configuration
    Config,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Directory => "Directory lookup failed",
            Self::Server => "Server state unreadable",
            Self::Rejected => "Change rejected by server",
            Self::Capacity => "License capacity exceeded",
            Self::Safety => "Unsafe change refused",
            Self::Network => "Connection failed",
            Self::Config => "Invalid configuration",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Directory => "Check the directory connection and the mapped group names",
            Self::Server => "Check that the project or team area still exists on the server",
            Self::Rejected => "Check that the user exists on the server",
            Self::Capacity => "Buy more seats or add the users to the license priority list",
            Self::Safety => "Set allow_empty_desired if the group is really meant to be empty",
            Self::Network => "Check the server URL, credentials and network access",
            Self::Config => "Fix the configuration file and run again",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single grant or revoke that the server rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyFailure {
    pub construct: Construct,
    pub identity: Identity,
    pub action: Action,
    pub cause: String,
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not {} {} on {}: {}",
            self.action, self.identity, self.construct, self.cause
        )
    }
}

/// Errors raised while reconciling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Error {
    /// Directory group could not be resolved
    #[error("directory lookup failed for group {group}: {message}")]
    Lookup {
        /// Directory group identifier
        group: String,
        /// Underlying failure
        message: String,
    },

    /// Current membership could not be read from the server
    #[error("could not read {construct}: {message}")]
    ServerQuery {
        /// Construct being read
        construct: String,
        /// Underlying failure
        message: String,
    },

    /// A single grant or revoke failed
    #[error("{0}")]
    Apply(ApplyFailure),

    /// License pool ran out of seats
    #[error(
        "{license} is at capacity ({capacity} seats); left unassigned: {}",
        join_ids(.unassigned)
    )]
    CapacityExceeded {
        /// License identifier
        license: String,
        /// Configured seat count
        capacity: usize,
        /// Identities that wanted a seat and did not get one
        unassigned: Vec<Identity>,
    },

    /// Desired set is empty and revoking everyone was not allowed
    #[error(
        "refusing to revoke all {count} holders of {construct}: mapped directory groups are empty"
    )]
    UnsafeEmptyDesiredSet {
        /// Construct that would have been emptied
        construct: String,
        /// Number of identities that would have been revoked
        count: usize,
    },

    /// Server connection or authentication failed
    #[error("connection to {server} failed: {message}")]
    Connection {
        /// Server label
        server: String,
        /// Underlying failure
        message: String,
        /// Whether a later attempt could succeed
        retryable: bool,
    },

    /// Process area does not exist on the server
    #[error("process area not found: {area}")]
    AreaNotFound {
        /// Area path
        area: String,
    },

    /// Skipped because an enclosing area failed
    #[error("skipped because enclosing area {area} failed")]
    AncestorFailed {
        /// Path of the failed ancestor
        area: String,
    },

    /// Configuration defect, reported before any server is touched
    #[error("invalid configuration: {message}")]
    Config {
        /// What is wrong
        message: String,
    },
}

impl Error {
    pub fn lookup(group: &str, err: &anyhow::Error) -> Self {
        Self::Lookup {
            group: group.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Classify a read failure, keeping typed errors raised by the provider.
    pub fn server_query(construct: &Construct, err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(typed @ Self::AreaNotFound { .. }) => typed,
            Ok(other) => Self::ServerQuery {
                construct: construct.to_string(),
                message: other.to_string(),
            },
            Err(err) => Self::ServerQuery {
                construct: construct.to_string(),
                message: format!("{err:#}"),
            },
        }
    }

    /// Classify a connect failure; providers mark transient failures by
    /// returning `Error::Connection { retryable: true, .. }`.
    pub fn connection(server: &str, err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(Self::Connection {
                message, retryable, ..
            }) => Self::Connection {
                server: server.to_string(),
                message,
                retryable,
            },
            Ok(other) => Self::Connection {
                server: server.to_string(),
                message: other.to_string(),
                retryable: false,
            },
            Err(err) => Self::Connection {
                server: server.to_string(),
                message: format!("{err:#}"),
                retryable: false,
            },
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Lookup { .. } => ErrorCategory::Directory,
            Self::ServerQuery { .. } | Self::AreaNotFound { .. } | Self::AncestorFailed { .. } => {
                ErrorCategory::Server
            }
            Self::Apply(_) => ErrorCategory::Rejected,
            Self::CapacityExceeded { .. } => ErrorCategory::Capacity,
            Self::UnsafeEmptyDesiredSet { .. } => ErrorCategory::Safety,
            Self::Connection { .. } => ErrorCategory::Network,
            Self::Config { .. } => ErrorCategory::Config,
        }
    }

    /// Whether a later attempt of the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { retryable: true, .. })
    }

    /// Partial errors leave the rest of the construct's changes applied.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Apply(_) | Self::CapacityExceeded { .. })
    }

    /// Errors that mean the process area itself is unusable, so nested
    /// areas must not be reconciled either. Lookup and read failures stay
    /// with the construct they hit.
    pub fn aborts_area(&self) -> bool {
        matches!(self, Self::AreaNotFound { .. } | Self::AncestorFailed { .. })
    }
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, Error>;

fn join_ids(ids: &[Identity]) -> String {
    let names: Vec<&str> = ids.iter().map(Identity::as_str).collect();
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_retryable_preserved() {
        let transient = anyhow::Error::new(Error::Connection {
            server: "unknown".into(),
            message: "503 Service Unavailable".into(),
            retryable: true,
        });
        let err = Error::connection("rtc1", transient);
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "connection to rtc1 failed: 503 Service Unavailable"
        );

        let plain = Error::connection("rtc1", anyhow::anyhow!("bad credentials"));
        assert!(!plain.is_retryable());
        assert_eq!(plain.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_server_query_keeps_area_not_found() {
        let construct = Construct::Members {
            area: crate::types::AreaPath::root("Gone"),
        };
        let err = Error::server_query(
            &construct,
            anyhow::Error::new(Error::AreaNotFound {
                area: "Gone".into(),
            }),
        );
        assert!(matches!(err, Error::AreaNotFound { .. }));

        let err = Error::server_query(&construct, anyhow::anyhow!("HTTP 500"));
        assert_eq!(err.to_string(), "could not read members of Gone: HTTP 500");
        assert!(!err.aborts_area());
    }

    #[test]
    fn test_capacity_message() {
        let err = Error::CapacityExceeded {
            license: "developer".into(),
            capacity: 2,
            unassigned: vec![Identity::from("frank"), Identity::from("gina")],
        };
        assert_eq!(
            err.to_string(),
            "developer is at capacity (2 seats); left unassigned: frank, gina"
        );
        assert!(err.is_partial());
        assert!(!err.aborts_area());
    }

    #[test]
    fn test_serialize_tagged() {
        let err = Error::config("no servers configured");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "config");
        assert_eq!(json["message"], "no servers configured");
    }
}
