//! Membership diff computation

use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::planner::Stage;
use crate::types::{Construct, ConstructReport, DeltaSet, MemberSet};

/// Compute the changes that turn `actual` into `desired`.
///
/// Pure and deterministic: both inputs are sets, and the result is ordered
/// because [`MemberSet`] is.
pub fn diff(desired: &MemberSet, actual: &MemberSet) -> DeltaSet {
    DeltaSet {
        to_add: desired.difference(actual).cloned().collect(),
        to_remove: actual.difference(desired).cloned().collect(),
    }
}

/// Refuse a delta that would strip every holder of a construct.
///
/// An empty desired set is indistinguishable from a directory that silently
/// returned nothing, so full revocation needs an explicit opt-in.
pub fn guard_full_revocation(
    construct: &Construct,
    delta: &DeltaSet,
    actual: &MemberSet,
    allow_empty_desired: bool,
) -> Result<()> {
    if !delta.is_full_revocation(actual) {
        return Ok(());
    }

    if allow_empty_desired {
        warn!(
            "Revoking all {} holders of {} (empty desired set allowed)",
            actual.len(),
            construct
        );
        return Ok(());
    }

    warn!(
        "Refusing to revoke all {} holders of {}: directory returned no members",
        actual.len(),
        construct
    );
    Err(Error::UnsafeEmptyDesiredSet {
        construct: construct.to_string(),
        count: actual.len(),
    })
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    /// Number of grants applied (or planned)
    pub additions: usize,
    /// Number of revocations applied (or planned)
    pub removals: usize,
    /// Constructs already in the desired state
    pub unchanged: usize,
    /// Constructs refused by the empty-desired-set guard
    pub refused: usize,
    /// Constructs or identities that failed
    pub failed: usize,
}

impl DiffSummary {
    /// Create a summary from a list of construct reports
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a ConstructReport>) -> Self {
        let mut summary = Self::default();
        for report in reports {
            summary.add_report(report);
        }
        summary
    }

    /// Add a report to the summary
    pub fn add_report(&mut self, report: &ConstructReport) {
        self.additions += report.granted.len();
        self.removals += report.revoked.len();
        self.failed += report.failures.len();
        match &report.error {
            Some(Error::UnsafeEmptyDesiredSet { .. }) => self.refused += 1,
            Some(_) => self.failed += 1,
            None if report.delta.is_empty() => self.unchanged += 1,
            None => {}
        }
    }

    /// Total number of membership changes
    pub fn total(&self) -> usize {
        self.additions + self.removals
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group reports by reconciler stage
pub fn group_by_stage(reports: &[ConstructReport]) -> BTreeMap<Stage, Vec<&ConstructReport>> {
    let mut groups: BTreeMap<Stage, Vec<&ConstructReport>> = BTreeMap::new();
    for report in reports {
        groups
            .entry(report.construct.stage())
            .or_default()
            .push(report);
    }
    groups
}
