//! Repository permission group reconciliation

use log::debug;

use crate::config::PermissionMapping;
use crate::executor::{PlannedChange, ServerPass};
use crate::types::{Construct, ConstructReport};

/// Converge every permission group on the server.
///
/// Runs in two phases across all groups: every revocation is issued before
/// any grant, so a user moving between groups never briefly holds both.
pub fn reconcile_permissions(
    pass: &mut ServerPass<'_>,
    mappings: &[PermissionMapping],
) -> Vec<ConstructReport> {
    let mut reports: Vec<Option<ConstructReport>> = Vec::with_capacity(mappings.len());
    let mut planned: Vec<(usize, PlannedChange, ConstructReport)> = Vec::new();

    for mapping in mappings {
        let construct = Construct::permission(&mapping.permission_group);
        match pass.plan_or_report(construct, &mapping.groups) {
            Ok(change) => {
                let report = change.report(pass.is_dry_run());
                planned.push((reports.len(), change, report));
                reports.push(None);
            }
            Err(aborted) => reports.push(Some(aborted)),
        }
    }

    debug!("Permissions: {} groups planned", planned.len());

    for (_, change, report) in &mut planned {
        for identity in &change.delta.to_remove {
            pass.revoke(identity, report);
        }
    }
    for (_, change, report) in &mut planned {
        for identity in &change.delta.to_add {
            pass.grant(identity, report);
        }
    }

    for (index, _, report) in planned {
        reports[index] = Some(report);
    }
    reports.into_iter().flatten().collect()
}
