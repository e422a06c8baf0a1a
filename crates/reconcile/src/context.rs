//! Provider traits for the directory and the target servers
//!
//! These traits let the engine run without depending on a specific LDAP
//! client, server API, or UI. Providers return `anyhow::Result`; the
//! engine attaches construct and group context and maps failures onto the
//! typed [`Error`](crate::Error) taxonomy.

use anyhow::Result;
use log::{debug, warn};
use std::collections::BTreeMap;

use crate::config::ServerConfig;
use crate::types::{ConstructReport, Construct, Identity, MemberSet, SyncOutcome};

/// Resolves desired state from the directory
pub trait DirectoryLookup: Send + Sync {
    /// Members of a directory group, in the order the directory lists them.
    ///
    /// Duplicates are allowed; the engine de-duplicates.
    fn resolve_group_members(&self, group: &str) -> Result<Vec<Identity>>;

    /// Display/audit attributes of a user (e.g. `cn`, `mail`).
    fn resolve_user_attributes(&self, identity: &Identity) -> Result<BTreeMap<String, Vec<String>>>;
}

/// Reads current access state from one server
pub trait ServerStateReader {
    /// Identities currently holding the construct
    fn current_members(&mut self, construct: &Construct) -> Result<MemberSet>;
}

/// Applies grant/revoke operations on one server.
///
/// Both operations must be idempotent: granting an already-held construct
/// or revoking an absent one succeeds without change.
pub trait ServerStateWriter {
    fn grant(&mut self, construct: &Construct, identity: &Identity) -> Result<()>;

    fn revoke(&mut self, construct: &Construct, identity: &Identity) -> Result<()>;
}

/// An authenticated session with one server
pub trait ServerSession: ServerStateReader + ServerStateWriter + Send {
    /// Release the session
    fn disconnect(&mut self) -> Result<()>;
}

/// Opens sessions to servers
pub trait ServerConnector: Send + Sync {
    /// Connect and authenticate.
    ///
    /// Return `Error::Connection { retryable: true, .. }` (wrapped in
    /// `anyhow`) for failures worth retrying.
    fn connect(&self, server: &ServerConfig) -> Result<Box<dyn ServerSession>>;
}

/// Disconnects its session on every exit path, including unwinding
pub struct SessionGuard {
    session: Box<dyn ServerSession>,
    server: String,
    disconnected: bool,
}

impl SessionGuard {
    pub fn new(session: Box<dyn ServerSession>, server: impl Into<String>) -> Self {
        Self {
            session,
            server: server.into(),
            disconnected: false,
        }
    }

    pub fn session(&mut self) -> &mut dyn ServerSession {
        self.session.as_mut()
    }

    /// Disconnect now and report the result
    pub fn disconnect(mut self) -> Result<()> {
        self.disconnected = true;
        debug!("Disconnecting from {}", self.server);
        self.session.disconnect()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        if let Err(e) = self.session.disconnect() {
            warn!("Failed to disconnect from {}: {:#}", self.server, e);
        }
    }
}

/// Progress callback for a reconciliation run
///
/// When servers run in parallel the per-server callbacks are delivered
/// after the pool finishes, in configuration order.
pub trait ProgressCallback: Send {
    /// Called once before any server is contacted
    fn on_run_start(&mut self, servers: usize, parallel: bool);

    /// Called when a server pass begins
    fn on_server_start(&mut self, server: &str);

    /// Called for each reconciled construct
    fn on_construct_complete(&mut self, server: &str, report: &ConstructReport);

    /// Called when a server pass ends
    fn on_server_complete(&mut self, outcome: &SyncOutcome);

    /// Called once after every server
    fn on_run_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _servers: usize, _parallel: bool) {}
    fn on_server_start(&mut self, _server: &str) {}
    fn on_construct_complete(&mut self, _server: &str, _report: &ConstructReport) {}
    fn on_server_complete(&mut self, _outcome: &SyncOutcome) {}
    fn on_run_complete(&mut self) {}
}
