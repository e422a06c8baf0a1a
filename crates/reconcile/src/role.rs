//! Project and team area role reconciliation

use log::{debug, warn};

use crate::config::AreaNode;
use crate::error::Error;
use crate::executor::ServerPass;
use crate::hierarchy::{self, HierarchyNode};
use crate::types::{AreaPath, ConstructReport};

/// Converge every configured project tree on the server
pub fn reconcile_roles(pass: &mut ServerPass<'_>, projects: &[AreaNode]) -> Vec<ConstructReport> {
    projects
        .iter()
        .flat_map(|project| reconcile_project(pass, project))
        .collect()
}

/// Converge one project tree, parents before children.
///
/// A node whose area is missing on the server is reported and all its
/// descendants are skipped with `AncestorFailed`. Siblings are unaffected.
/// A failed lookup or read only aborts its own construct.
pub fn reconcile_project(pass: &mut ServerPass<'_>, project: &AreaNode) -> Vec<ConstructReport> {
    let levels = hierarchy::levels(project);
    let mut reports = Vec::new();
    let mut failed: Vec<AreaPath> = Vec::new();

    for level in levels.iter() {
        for node in level {
            if let Some(ancestor) = failed.iter().find(|f| f.is_ancestor_of(node.path)) {
                debug!("Skipping {}: {} failed", node.path, ancestor);
                skip_node(&node, ancestor, &mut reports);
                continue;
            }
            if reconcile_node(pass, &node, &mut reports) {
                warn!("Area {} failed; skipping its team areas", node.path);
                failed.push(node.path.clone());
            }
        }
    }
    reports
}

/// Returns true when the area itself is unusable
fn reconcile_node(
    pass: &mut ServerPass<'_>,
    node: &HierarchyNode<'_>,
    reports: &mut Vec<ConstructReport>,
) -> bool {
    let mut node_failed = false;
    let mut missing: Option<Error> = None;

    for (construct, groups) in node.node.constructs(node.path) {
        if let Some(error) = &missing {
            reports.push(ConstructReport::aborted(construct, groups.to_vec(), error.clone()));
            continue;
        }

        match pass.plan_or_report(construct, groups) {
            Ok(change) => reports.push(pass.apply(&change)),
            Err(report) => {
                if let Some(error) = &report.error {
                    node_failed |= error.aborts_area();
                    if matches!(error, Error::AreaNotFound { .. }) {
                        missing = Some(error.clone());
                    }
                }
                reports.push(report);
            }
        }
    }
    node_failed
}

fn skip_node(node: &HierarchyNode<'_>, ancestor: &AreaPath, reports: &mut Vec<ConstructReport>) {
    for (construct, groups) in node.node.constructs(node.path) {
        reports.push(ConstructReport::aborted(
            construct,
            groups.to_vec(),
            Error::AncestorFailed {
                area: ancestor.to_string(),
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoleMapping;
    use crate::memory::{Call, InMemoryDirectory, InMemoryServer};
    use crate::types::{Construct, Identity, MemberSet, SyncOptions};

    fn node(name: &str, members: &str) -> AreaNode {
        AreaNode {
            members: Some(vec![members.to_string()]),
            ..AreaNode::new(name)
        }
    }

    fn members(path: &str) -> Construct {
        Construct::Members {
            area: AreaPath::parse(path),
        }
    }

    #[test]
    fn test_missing_area_skips_descendants_only() {
        let mut backend = node("Backend", "G-Dev");
        backend.team_areas.push(node("Ledger", "G-Dev"));
        let mut project = node("Payments", "G-Dev");
        project.team_areas.push(backend);
        project.team_areas.push(node("Frontend", "G-Dev"));

        let directory = InMemoryDirectory::new().with_group("G-Dev", &["dave"]);
        let server = InMemoryServer::new().with_missing_area(AreaPath::parse("Payments/Backend"));
        let mut session = server.clone();
        let options = SyncOptions::default();
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        let reports = reconcile_project(&mut pass, &project);

        assert_eq!(reports.len(), 4);
        assert!(!reports[0].is_failure());
        assert!(matches!(reports[1].error, Some(Error::AreaNotFound { .. })));
        assert!(!reports[2].is_failure(), "sibling must still converge");
        assert!(matches!(
            reports[3].error,
            Some(Error::AncestorFailed { ref area }) if area == "Payments/Backend"
        ));
        assert!(!server.calls().contains(&Call::Read(members("Payments/Backend/Ledger"))));
    }

    #[test]
    fn test_area_not_found_short_circuits_node() {
        let project = AreaNode {
            administrators: Some(vec!["G-Leads".to_string()]),
            members: Some(vec!["G-Dev".to_string()]),
            roles: vec![RoleMapping {
                role: "Tester".to_string(),
                groups: vec!["G-QA".to_string()],
            }],
            ..AreaNode::new("Gone")
        };
        let directory = InMemoryDirectory::new()
            .with_group("G-Leads", &["alice"])
            .with_group("G-Dev", &["dave"])
            .with_group("G-QA", &["quinn"]);
        let server = InMemoryServer::new().with_missing_area(AreaPath::root("Gone"));
        let mut session = server.clone();
        let options = SyncOptions::default();
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        let reports = reconcile_project(&mut pass, &project);

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| matches!(r.error, Some(Error::AreaNotFound { .. }))));
        let reads = server
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Read(_)))
            .count();
        assert_eq!(reads, 1);
    }

    #[test]
    fn test_failed_role_lookup_does_not_skip_team_areas() {
        let mut project = AreaNode {
            roles: vec![RoleMapping {
                role: "Tester".to_string(),
                groups: vec!["G-Typo".to_string()],
            }],
            ..AreaNode::new("P")
        };
        project.team_areas.push(node("T", "G-Team"));

        let directory = InMemoryDirectory::new().with_group("G-Team", &["bob"]);
        let server = InMemoryServer::new();
        let mut session = server.clone();
        let options = SyncOptions::default();
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        let reports = reconcile_project(&mut pass, &project);

        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].error, Some(Error::Lookup { .. })));
        assert!(!reports[1].is_failure(), "team area must still converge");
        assert_eq!(server.members(&members("P/T")), MemberSet::from(["bob".into()]));
    }

    #[test]
    fn test_unreadable_construct_keeps_rest_of_node() {
        let mut project = AreaNode {
            administrators: Some(vec!["G-Leads".to_string()]),
            members: Some(vec!["G-Dev".to_string()]),
            ..AreaNode::new("Payments")
        };
        project.team_areas.push(node("Backend", "G-Dev"));

        let directory = InMemoryDirectory::new()
            .with_group("G-Leads", &["alice"])
            .with_group("G-Dev", &["dave"]);
        let server = InMemoryServer::new().with_unreadable(Construct::Administrators {
            area: AreaPath::root("Payments"),
        });
        let mut session = server.clone();
        let options = SyncOptions::default();
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        let reports = reconcile_project(&mut pass, &project);

        assert_eq!(reports.len(), 3);
        assert!(matches!(reports[0].error, Some(Error::ServerQuery { .. })));
        assert_eq!(reports[1].granted, vec![Identity::from("dave")]);
        assert_eq!(reports[2].granted, vec![Identity::from("dave")]);
    }

    #[test]
    fn test_unconfigured_role_left_untouched() {
        let project = AreaNode {
            roles: vec![RoleMapping {
                role: "Tester".to_string(),
                groups: vec!["G-QA".to_string()],
            }],
            ..AreaNode::new("Payments")
        };
        let directory = InMemoryDirectory::new().with_group("G-QA", &["quinn"]);
        let developer = Construct::role(AreaPath::root("Payments"), "Developer");
        let server = InMemoryServer::new().with_members(developer.clone(), &["dave"]);
        let mut session = server.clone();
        let options = SyncOptions::default();
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        let reports = reconcile_project(&mut pass, &project);

        assert_eq!(reports.len(), 1);
        assert_eq!(server.members(&developer).len(), 1);
        assert!(server.members(&members("Payments")).is_empty());
    }
}
