//! Execution engine - plans one construct and applies its delta

use log::{debug, info, warn};

use crate::context::{DirectoryLookup, ServerSession};
use crate::desired::{DesiredMembers, DesiredResolver};
use crate::diff::{diff, guard_full_revocation};
use crate::error::{ApplyFailure, Error, Result};
use crate::types::{Action, Construct, ConstructReport, DeltaSet, Identity, MemberSet, SyncOptions};

/// Desired and actual state of one construct, and the delta between them
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub construct: Construct,
    pub groups: Vec<String>,
    pub desired: DesiredMembers,
    pub actual: MemberSet,
    pub delta: DeltaSet,
}

impl PlannedChange {
    /// Start a report for this change
    pub fn report(&self, dry_run: bool) -> ConstructReport {
        ConstructReport::new(
            self.construct.clone(),
            self.groups.clone(),
            self.delta.clone(),
            dry_run,
        )
    }
}

/// Everything one server's reconciliation pass works against
pub struct ServerPass<'a> {
    session: &'a mut dyn ServerSession,
    resolver: DesiredResolver<'a>,
    options: &'a SyncOptions,
    allow_empty_desired: bool,
}

impl<'a> ServerPass<'a> {
    pub fn new(
        session: &'a mut dyn ServerSession,
        directory: &'a dyn DirectoryLookup,
        options: &'a SyncOptions,
        allow_empty_desired: bool,
    ) -> Self {
        Self {
            session,
            resolver: DesiredResolver::new(directory),
            options,
            allow_empty_desired,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Read desired and actual state and diff them.
    ///
    /// Fails with `Lookup`, `ServerQuery`/`AreaNotFound`, or
    /// `UnsafeEmptyDesiredSet`; in every case nothing has been written.
    pub fn plan(&mut self, construct: Construct, groups: &[String]) -> Result<PlannedChange> {
        let desired = self.resolver.resolve(groups)?;
        let actual = self
            .session
            .current_members(&construct)
            .map_err(|e| Error::server_query(&construct, e))?;

        let delta = diff(&desired.set, &actual);
        debug!(
            "{}: {} desired, {} actual, +{} -{}",
            construct,
            desired.set.len(),
            actual.len(),
            delta.to_add.len(),
            delta.to_remove.len()
        );

        guard_full_revocation(&construct, &delta, &actual, self.allow_empty_desired)?;

        Ok(PlannedChange {
            construct,
            groups: groups.to_vec(),
            desired,
            actual,
            delta,
        })
    }

    /// Plan a construct, turning a planning failure into an aborted report
    pub fn plan_or_report(
        &mut self,
        construct: Construct,
        groups: &[String],
    ) -> std::result::Result<PlannedChange, ConstructReport> {
        self.plan(construct.clone(), groups).map_err(|e| {
            warn!("Skipping {}: {}", construct, e);
            ConstructReport::aborted(construct, groups.to_vec(), e)
        })
    }

    /// Revoke one identity, recording the outcome. Returns true on success.
    pub fn revoke(&mut self, identity: &Identity, report: &mut ConstructReport) -> bool {
        self.execute(Action::Revoke, identity, report)
    }

    /// Grant one identity, recording the outcome. Returns true on success.
    pub fn grant(&mut self, identity: &Identity, report: &mut ConstructReport) -> bool {
        self.execute(Action::Grant, identity, report)
    }

    /// Apply a whole delta: every revocation first, then every grant
    pub fn apply(&mut self, planned: &PlannedChange) -> ConstructReport {
        let mut report = planned.report(self.is_dry_run());
        for identity in &planned.delta.to_remove {
            self.revoke(identity, &mut report);
        }
        for identity in &planned.delta.to_add {
            self.grant(identity, &mut report);
        }
        report
    }

    fn execute(
        &mut self,
        action: Action,
        identity: &Identity,
        report: &mut ConstructReport,
    ) -> bool {
        let construct = &report.construct;

        if self.options.dry_run {
            info!("[dry run] would {} {} on {}", action, identity, construct);
            record(report, action, identity);
            return true;
        }

        let result = match action {
            Action::Grant => self.session.grant(construct, identity),
            Action::Revoke => self.session.revoke(construct, identity),
        };

        match result {
            Ok(()) => {
                info!(
                    "{} {} on {}{}",
                    past_tense(action),
                    identity,
                    construct,
                    self.describe(identity)
                );
                record(report, action, identity);
                true
            }
            Err(e) => {
                let failure = ApplyFailure {
                    construct: construct.clone(),
                    identity: identity.clone(),
                    action,
                    cause: format!("{e:#}"),
                };
                warn!("{}", failure);
                report.failures.push(failure);
                false
            }
        }
    }

    /// Display attributes for audit logging; lookup failures are ignored
    fn describe(&self, identity: &Identity) -> String {
        if !self.options.describe_users {
            return String::new();
        }
        match self.resolver.directory().resolve_user_attributes(identity) {
            Ok(attributes) => {
                let shown: Vec<&str> = ["cn", "displayName", "mail"]
                    .iter()
                    .filter_map(|key| attributes.get(*key).and_then(|v| v.first()))
                    .map(String::as_str)
                    .collect();
                if shown.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", shown.join(", "))
                }
            }
            Err(e) => {
                debug!("No directory attributes for {}: {:#}", identity, e);
                String::new()
            }
        }
    }
}

fn record(report: &mut ConstructReport, action: Action, identity: &Identity) {
    match action {
        Action::Grant => report.granted.push(identity.clone()),
        Action::Revoke => report.revoked.push(identity.clone()),
    }
}

fn past_tense(action: Action) -> &'static str {
    match action {
        Action::Grant => "Granted",
        Action::Revoke => "Revoked",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Call, InMemoryDirectory, InMemoryServer};

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_apply_revokes_before_grants() {
        let directory = InMemoryDirectory::new().with_group("G-Admins", &["alice", "bob"]);
        let server = InMemoryServer::new()
            .with_members(Construct::permission("JazzAdmins"), &["bob", "carol"]);
        let mut session = server.clone();
        let options = SyncOptions::default();
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        let planned = pass
            .plan(Construct::permission("JazzAdmins"), &groups(&["G-Admins"]))
            .unwrap();
        let report = pass.apply(&planned);

        assert_eq!(report.granted, vec![Identity::from("alice")]);
        assert_eq!(report.revoked, vec![Identity::from("carol")]);
        assert!(!report.is_failure());

        let writes: Vec<Call> = server.calls().into_iter().filter(Call::is_write).collect();
        assert_eq!(
            writes,
            vec![
                Call::Revoke(Construct::permission("JazzAdmins"), "carol".into()),
                Call::Grant(Construct::permission("JazzAdmins"), "alice".into()),
            ]
        );
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let directory = InMemoryDirectory::new().with_group("G-Admins", &["alice"]);
        let server =
            InMemoryServer::new().with_members(Construct::permission("JazzAdmins"), &["carol"]);
        let mut session = server.clone();
        let options = SyncOptions {
            dry_run: true,
            ..Default::default()
        };
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        let planned = pass
            .plan(Construct::permission("JazzAdmins"), &groups(&["G-Admins"]))
            .unwrap();
        let report = pass.apply(&planned);

        assert!(report.dry_run);
        assert_eq!(report.applied(), 2);
        assert!(server.calls().iter().all(|c| !c.is_write()));
        assert_eq!(
            server.members(&Construct::permission("JazzAdmins")),
            MemberSet::from([Identity::from("carol")])
        );
    }

    #[test]
    fn test_failed_grant_is_recorded_and_skipped() {
        let directory = InMemoryDirectory::new().with_group("G-Users", &["ghost", "alice"]);
        let server = InMemoryServer::new().with_unknown_user("ghost");
        let mut session = server.clone();
        let options = SyncOptions::default();
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        let planned = pass
            .plan(Construct::permission("JazzUsers"), &groups(&["G-Users"]))
            .unwrap();
        let report = pass.apply(&planned);

        assert_eq!(report.granted, vec![Identity::from("alice")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].identity, Identity::from("ghost"));
        assert_eq!(report.failures[0].action, Action::Grant);
        assert!(report.is_failure());
        assert!(!report.is_aborted());
    }

    #[test]
    fn test_missing_user_attributes_do_not_block_grants() {
        let directory = InMemoryDirectory::new()
            .with_group("G-Users", &["alice", "bob"])
            .with_user("alice", &[("cn", "Alice Adams"), ("mail", "alice@example.com")]);
        let server = InMemoryServer::new();
        let mut session = server.clone();
        let options = SyncOptions {
            describe_users: true,
            ..Default::default()
        };
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        assert_eq!(
            pass.describe(&Identity::from("alice")),
            " (Alice Adams, alice@example.com)"
        );
        assert_eq!(pass.describe(&Identity::from("bob")), "");

        let planned = pass
            .plan(Construct::permission("JazzUsers"), &groups(&["G-Users"]))
            .unwrap();
        let report = pass.apply(&planned);

        assert!(!report.is_failure());
        assert_eq!(
            server.members(&Construct::permission("JazzUsers")),
            MemberSet::from([Identity::from("alice"), Identity::from("bob")])
        );
    }

    #[test]
    fn test_plan_refuses_full_revocation() {
        let directory = InMemoryDirectory::new().with_group("G-Admins", &[]);
        let server =
            InMemoryServer::new().with_members(Construct::permission("JazzAdmins"), &["bob"]);
        let mut session = server.clone();
        let options = SyncOptions::default();
        let mut pass = ServerPass::new(&mut session, &directory, &options, false);

        let report = pass
            .plan_or_report(Construct::permission("JazzAdmins"), &groups(&["G-Admins"]))
            .unwrap_err();

        assert!(matches!(report.error, Some(Error::UnsafeEmptyDesiredSet { count: 1, .. })));
        assert!(server.calls().iter().all(|c| !c.is_write()));
    }
}
