//! # Reconcile
//!
//! Directory-driven access reconciliation for collaboration servers.
//!
//! The directory is the source of truth for who should hold what. For every
//! configured server this crate reads the current holders of each permission
//! group, license and project/team area role, computes the delta against the
//! directory, and converges the server by issuing grants and revocations.
//!
//! ## Core Concepts
//!
//! - **Construct**: the thing being reconciled (permission group, license,
//!   area administrators / members, process role)
//! - **DeltaSet**: identities to add and to remove for one construct
//! - **ServerPass**: one server's reconciliation, with directory lookups
//!   memoized for the duration of the pass
//! - **Orchestrator**: runs the permission, license and role reconcilers
//!   against every server, isolating failures per server
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{Orchestrator, SyncOptions};
//!
//! let orchestrator = Orchestrator::new(&directory, &connector, SyncOptions::default());
//! let report = orchestrator.run(&servers)?;
//! std::process::exit(report.status().exit_code().into());
//! ```
//!
//! ## Provider Traits
//!
//! - [`DirectoryLookup`]: resolves group members and user attributes
//! - [`ServerConnector`] / [`ServerSession`]: read and write server state
//! - [`ProgressCallback`]: receives progress updates
//!
//! The `memory` module provides in-memory directory and server implementations
//! for tests.

pub mod config;
pub mod context;
pub mod desired;
pub mod diff;
pub mod error;
pub mod executor;
pub mod hierarchy;
pub mod license;
pub mod memory;
pub mod orchestrator;
pub mod permission;
pub mod planner;
pub mod retry;
pub mod role;
pub mod types;

// Re-export main types for convenience
pub use config::{
    AreaNode, GroupMapping, LicensePool, PermissionMapping, RoleMapping, ServerConfig,
    validate_servers,
};
pub use context::{
    DirectoryLookup, NoProgress, ProgressCallback, ServerConnector, ServerSession,
    ServerStateReader, ServerStateWriter, SessionGuard,
};
pub use diff::{DiffSummary, diff, group_by_stage};
pub use error::{ApplyFailure, Error, ErrorCategory, Result};
pub use orchestrator::{Orchestrator, SyncReport};
pub use planner::{Stage, SyncPlan};
pub use retry::RetryConfig;
pub use types::{
    Action, AreaPath, Construct, ConstructReport, DeltaSet, Identity, MemberSet, OutcomeStatus,
    RunStatus, SyncOptions, SyncOutcome,
};
