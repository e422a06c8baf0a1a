//! Client access license reconciliation with seat capacity

use log::{debug, warn};
use std::collections::BTreeSet;

use crate::config::LicensePool;
use crate::error::Error;
use crate::executor::ServerPass;
use crate::types::{Construct, ConstructReport, Identity, MemberSet};

/// Converge every license pool on the server, one pool at a time
pub fn reconcile_licenses(
    pass: &mut ServerPass<'_>,
    pools: &[LicensePool],
) -> Vec<ConstructReport> {
    pools.iter().map(|pool| reconcile_pool(pass, pool)).collect()
}

/// Converge one pool.
///
/// Revocations always run first and free seats. Grants then fill the
/// seats actually available, in priority order; whoever does not fit is
/// reported as `CapacityExceeded` and picked up by a later run.
pub fn reconcile_pool(pass: &mut ServerPass<'_>, pool: &LicensePool) -> ConstructReport {
    let construct = Construct::license(&pool.license);
    let change = match pass.plan_or_report(construct, &pool.groups) {
        Ok(change) => change,
        Err(aborted) => return aborted,
    };
    let mut report = change.report(pass.is_dry_run());

    let mut freed = 0;
    for identity in &change.delta.to_remove {
        if pass.revoke(identity, &mut report) {
            freed += 1;
        }
    }

    let queue = prioritize(&change.delta.to_add, &pool.priority, &change.desired.ordered);
    let Some(capacity) = pool.capacity else {
        for identity in &queue {
            pass.grant(identity, &mut report);
        }
        return report;
    };

    let held = change.actual.len().saturating_sub(freed);
    let available = capacity.saturating_sub(held);
    debug!(
        "{}: {} of {} seats held, {} available, {} waiting",
        report.construct,
        held,
        capacity,
        available,
        queue.len()
    );

    let mut assigned = 0;
    let mut remaining = queue.into_iter();
    while assigned < available {
        let Some(identity) = remaining.next() else {
            break;
        };
        // a rejected grant does not take a seat
        if pass.grant(&identity, &mut report) {
            assigned += 1;
        }
    }

    let unassigned: Vec<Identity> = remaining.collect();
    if !unassigned.is_empty() {
        let error = Error::CapacityExceeded {
            license: pool.license.clone(),
            capacity,
            unassigned,
        };
        warn!("{}", error);
        report.error = Some(error);
    }
    report
}

/// Order pending grants: configured priority list first, then the order
/// the directory listed the identities in.
pub fn prioritize(
    to_add: &MemberSet,
    priority: &[Identity],
    directory_order: &[Identity],
) -> Vec<Identity> {
    let mut queued = BTreeSet::new();
    let mut queue = Vec::with_capacity(to_add.len());

    for identity in priority.iter().chain(directory_order).chain(to_add) {
        if to_add.contains(identity) && queued.insert(identity) {
            queue.push(identity.clone());
        }
    }
    queue
}
