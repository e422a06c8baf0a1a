//! Core types for membership reconciliation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{ApplyFailure, Error};
use crate::planner::Stage;
use crate::retry::RetryConfig;

/// A stable user identifier shared by the directory and the target servers
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sorted set of identities; iteration order is stable for logging
pub type MemberSet = BTreeSet<Identity>;

/// Path of a project or team area, project first
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaPath(Vec<String>);

impl AreaPath {
    /// Path of a project (the root of a hierarchy)
    pub fn root(project: impl Into<String>) -> Self {
        Self(vec![project.into()])
    }

    /// Parse a slash-separated path ("Project/Team/Sub")
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Path of a nested team area
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Depth in the hierarchy (the project is depth 0)
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Last segment of the path
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// Whether `other` is nested (at any depth) below this area
    pub fn is_ancestor_of(&self, other: &AreaPath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for AreaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// The server-side thing being reconciled
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Construct {
    /// Repository permission group (e.g. JazzAdmins)
    Permission { group: String },
    /// Client access license
    License { license: String },
    /// Administrators of a project or team area
    Administrators { area: AreaPath },
    /// Members of a project or team area
    Members { area: AreaPath },
    /// Holders of a process role within a project or team area
    Role { area: AreaPath, role: String },
}

impl Construct {
    pub fn permission(group: impl Into<String>) -> Self {
        Self::Permission {
            group: group.into(),
        }
    }

    pub fn license(license: impl Into<String>) -> Self {
        Self::License {
            license: license.into(),
        }
    }

    pub fn role(area: AreaPath, role: impl Into<String>) -> Self {
        Self::Role {
            area,
            role: role.into(),
        }
    }

    /// The reconciler stage this construct belongs to
    pub fn stage(&self) -> Stage {
        match self {
            Self::Permission { .. } => Stage::Permissions,
            Self::License { .. } => Stage::Licenses,
            Self::Administrators { .. } | Self::Members { .. } | Self::Role { .. } => Stage::Roles,
        }
    }

    /// The process area this construct lives in, if any
    pub fn area(&self) -> Option<&AreaPath> {
        match self {
            Self::Administrators { area } | Self::Members { area } | Self::Role { area, .. } => {
                Some(area)
            }
            Self::Permission { .. } | Self::License { .. } => None,
        }
    }
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission { group } => write!(f, "permission group {group}"),
            Self::License { license } => write!(f, "license {license}"),
            Self::Administrators { area } => write!(f, "administrators of {area}"),
            Self::Members { area } => write!(f, "members of {area}"),
            Self::Role { area, role } => write!(f, "role {role} in {area}"),
        }
    }
}

/// Additive and subtractive changes for one construct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSet {
    pub to_add: MemberSet,
    pub to_remove: MemberSet,
}

impl DeltaSet {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Total number of operations
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    /// Whether applying this delta would leave `actual` with nobody in it
    pub fn is_full_revocation(&self, actual: &MemberSet) -> bool {
        !actual.is_empty() && self.to_add.is_empty() && self.to_remove == *actual
    }

    /// The membership that results from applying this delta to `actual`
    pub fn apply_to(&self, actual: &MemberSet) -> MemberSet {
        actual
            .union(&self.to_add)
            .filter(|id| !self.to_remove.contains(*id))
            .cloned()
            .collect()
    }
}

/// Direction of a single membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Grant,
    Revoke,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grant => f.write_str("grant"),
            Self::Revoke => f.write_str("revoke"),
        }
    }
}

/// Result of reconciling one construct on one server
#[derive(Debug, Clone, Serialize)]
pub struct ConstructReport {
    pub construct: Construct,
    /// Directory groups the desired set was built from
    pub groups: Vec<String>,
    pub delta: DeltaSet,
    pub granted: Vec<Identity>,
    pub revoked: Vec<Identity>,
    pub failures: Vec<ApplyFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    /// Changes were computed but not written
    pub dry_run: bool,
}

impl ConstructReport {
    pub fn new(construct: Construct, groups: Vec<String>, delta: DeltaSet, dry_run: bool) -> Self {
        Self {
            construct,
            groups,
            delta,
            granted: Vec::new(),
            revoked: Vec::new(),
            failures: Vec::new(),
            error: None,
            dry_run,
        }
    }

    /// A construct that could not be reconciled at all
    pub fn aborted(construct: Construct, groups: Vec<String>, error: Error) -> Self {
        Self {
            error: Some(error),
            ..Self::new(construct, groups, DeltaSet::default(), false)
        }
    }

    /// Any failure, partial or total
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || !self.failures.is_empty()
    }

    /// The construct was not reconciled (no operations were attempted)
    pub fn is_aborted(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_partial())
    }

    /// Already in the desired state
    pub fn is_unchanged(&self) -> bool {
        self.error.is_none() && self.delta.is_empty()
    }

    /// Number of operations that were applied (or would be, in a dry run)
    pub fn applied(&self) -> usize {
        self.granted.len() + self.revoked.len()
    }
}

/// Per-server status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
}

/// Result of one server's reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub server: String,
    pub status: OutcomeStatus,
    pub reports: Vec<ConstructReport>,
    /// Server-level failure (connection, authentication)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncOutcome {
    /// Outcome of a pass that reached the server
    pub fn completed(
        server: impl Into<String>,
        reports: Vec<ConstructReport>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let status = if reports.iter().any(ConstructReport::is_failure) {
            OutcomeStatus::Failed
        } else {
            OutcomeStatus::Succeeded
        };
        Self {
            server: server.into(),
            status,
            reports,
            error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Outcome of a pass that never got going
    pub fn failed(server: impl Into<String>, error: Error, started_at: DateTime<Utc>) -> Self {
        Self {
            server: server.into(),
            status: OutcomeStatus::Failed,
            reports: Vec::new(),
            error: Some(error),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }

    /// Reports that carry a failure
    pub fn failed_reports(&self) -> impl Iterator<Item = &ConstructReport> {
        self.reports.iter().filter(|r| r.is_failure())
    }
}

/// Overall result of a run, mapped to an exit code at the process boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every server converged
    Success,
    /// At least one server, construct or identity failed
    SyncFailures,
    /// Not enough information to run
    ConfigError,
}

impl RunStatus {
    /// Derive the status from a set of outcomes
    pub fn from_outcomes(outcomes: &[SyncOutcome]) -> Self {
        if outcomes.iter().any(SyncOutcome::is_failure) {
            Self::SyncFailures
        } else {
            Self::Success
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::SyncFailures => 1,
            Self::ConfigError => 2,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Options for a reconciliation run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Compute and report changes without writing them
    pub dry_run: bool,
    /// Number of servers reconciled concurrently
    pub jobs: usize,
    /// Permit deltas that revoke every member of a construct
    pub allow_empty_desired: bool,
    /// Log display attributes of users as they are granted or revoked
    pub describe_users: bool,
    /// Retry policy for establishing server connections
    pub retry: RetryConfig,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 1,
            allow_empty_desired: false,
            describe_users: false,
            retry: RetryConfig::default(),
        }
    }
}
