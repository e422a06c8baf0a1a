//! Sync orchestrator - runs every reconciler against every server

use chrono::Utc;
use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{ServerConfig, validate_servers};
use crate::context::{
    DirectoryLookup, NoProgress, ProgressCallback, ServerConnector, SessionGuard,
};
use crate::diff::DiffSummary;
use crate::error::{Error, Result};
use crate::executor::ServerPass;
use crate::license::reconcile_licenses;
use crate::permission::reconcile_permissions;
use crate::planner::{Stage, SyncPlan};
use crate::retry::with_retry;
use crate::role::reconcile_roles;
use crate::types::{ConstructReport, RunStatus, SyncOptions, SyncOutcome};

/// Outcomes of one run, in configuration order
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncReport {
    /// Overall status, for the process exit code
    pub fn status(&self) -> RunStatus {
        RunStatus::from_outcomes(&self.outcomes)
    }

    /// Totals across every server
    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_reports(self.outcomes.iter().flat_map(|o| &o.reports))
    }

    pub fn failed(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

/// Drives the permission, license and role reconcilers over a list of servers
pub struct Orchestrator<'a> {
    directory: &'a dyn DirectoryLookup,
    connector: &'a dyn ServerConnector,
    options: SyncOptions,
    plan: SyncPlan,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        directory: &'a dyn DirectoryLookup,
        connector: &'a dyn ServerConnector,
        options: SyncOptions,
    ) -> Self {
        Self {
            directory,
            connector,
            options,
            plan: SyncPlan::all(),
        }
    }

    /// Restrict the run to some servers or stages
    pub fn with_plan(mut self, plan: SyncPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Reconcile every server.
    ///
    /// Fails only for configuration defects, before any server is contacted.
    /// Everything else is recorded in the returned outcomes.
    pub fn run(&self, servers: &[ServerConfig]) -> Result<SyncReport> {
        self.run_with_progress(servers, &mut NoProgress)
    }

    pub fn run_with_progress(
        &self,
        servers: &[ServerConfig],
        progress: &mut dyn ProgressCallback,
    ) -> Result<SyncReport> {
        validate_servers(servers)?;

        let selected: Vec<&ServerConfig> = servers
            .iter()
            .filter(|s| self.plan.includes_server(s.label()))
            .collect();
        if selected.is_empty()
            && let Some(name) = &self.plan.server
        {
            return Err(Error::config(format!("no server named {name}")));
        }

        let parallel = self.options.jobs > 1 && selected.len() > 1;
        progress.on_run_start(selected.len(), parallel);

        let outcomes = if parallel {
            self.run_parallel(&selected, progress)
        } else {
            self.run_sequential(&selected, progress)
        };

        info!("Done");
        progress.on_run_complete();
        Ok(SyncReport { outcomes })
    }

    fn run_sequential(
        &self,
        servers: &[&ServerConfig],
        progress: &mut dyn ProgressCallback,
    ) -> Vec<SyncOutcome> {
        let mut outcomes = Vec::with_capacity(servers.len());
        for server in servers {
            progress.on_server_start(server.label());
            let outcome = self.sync_server(server, &mut |report: &ConstructReport| {
                progress.on_construct_complete(server.label(), report);
            });
            progress.on_server_complete(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Servers share no state, so each gets its own worker. Progress is
    /// reported after the pool finishes since callbacks are not thread-safe.
    fn run_parallel(
        &self,
        servers: &[&ServerConfig],
        progress: &mut dyn ProgressCallback,
    ) -> Vec<SyncOutcome> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Failed to create thread pool ({}), running sequentially", e);
                return self.run_sequential(servers, progress);
            }
        };

        let outcomes: Vec<SyncOutcome> = pool.install(|| {
            servers
                .par_iter()
                .map(|server| self.sync_server(server, &mut |_: &ConstructReport| {}))
                .collect()
        });

        for outcome in &outcomes {
            progress.on_server_start(&outcome.server);
            for report in &outcome.reports {
                progress.on_construct_complete(&outcome.server, report);
            }
            progress.on_server_complete(outcome);
        }
        outcomes
    }

    /// One server's pass: connect, run each stage in order, disconnect
    fn sync_server(
        &self,
        server: &ServerConfig,
        on_report: &mut dyn FnMut(&ConstructReport),
    ) -> SyncOutcome {
        let started_at = Utc::now();
        let label = server.label();
        info!("Synchronizing users for server: {}", server.url);

        let session = with_retry(&self.options.retry, label, || {
            self.connector
                .connect(server)
                .map_err(|e| Error::connection(label, e))
        });
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                error!("{}", e);
                return SyncOutcome::failed(label, e, started_at);
            }
        };

        let mut guard = SessionGuard::new(session, label);
        let allow_empty = server.allows_empty_desired(self.options.allow_empty_desired);
        let mut reports = Vec::new();
        {
            let mut pass =
                ServerPass::new(guard.session(), self.directory, &self.options, allow_empty);
            for stage in &self.plan.stages {
                let stage_reports = match stage {
                    Stage::Permissions => reconcile_permissions(&mut pass, &server.permissions),
                    Stage::Licenses => reconcile_licenses(&mut pass, &server.licenses),
                    Stage::Roles => reconcile_roles(&mut pass, &server.projects),
                };
                for report in &stage_reports {
                    on_report(report);
                }
                reports.extend(stage_reports);
            }
        }

        if let Err(e) = guard.disconnect() {
            warn!("Failed to disconnect from {}: {:#}", label, e);
        }

        let outcome = SyncOutcome::completed(label, reports, started_at);
        if outcome.is_failure() {
            warn!("{}: finished with failures", label);
        } else {
            info!("{}: in sync", label);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PermissionMapping;
    use crate::memory::{Call, InMemoryConnector, InMemoryDirectory, InMemoryServer};
    use crate::types::{Construct, Identity, MemberSet};

    fn server(label: &str) -> ServerConfig {
        let mut config = ServerConfig::new(format!("https://{label}:9443/ccm")).with_name(label);
        config.permissions.push(PermissionMapping {
            permission_group: "JazzAdmins".to_string(),
            groups: vec!["G-Admins".to_string()],
        });
        config
    }

    #[test]
    fn test_config_error_before_any_connect() {
        let directory = InMemoryDirectory::new();
        let connector = InMemoryConnector::new();
        let orchestrator = Orchestrator::new(&directory, &connector, SyncOptions::default());

        let err = orchestrator.run(&[]).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_unknown_target_server() {
        let directory = InMemoryDirectory::new().with_group("G-Admins", &["alice"]);
        let connector = InMemoryConnector::new().with_server("rtc1", InMemoryServer::new());
        let orchestrator = Orchestrator::new(&directory, &connector, SyncOptions::default())
            .with_plan(SyncPlan::from_target(Some("rtc9")).unwrap());

        assert!(orchestrator.run(&[server("rtc1")]).is_err());
        assert_eq!(connector.attempts("rtc1"), 0);
    }

    #[test]
    fn test_session_released_after_pass() {
        let directory = InMemoryDirectory::new().with_group("G-Admins", &["alice"]);
        let rtc1 = InMemoryServer::new();
        let connector = InMemoryConnector::new().with_server("rtc1", rtc1.clone());
        let orchestrator = Orchestrator::new(&directory, &connector, SyncOptions::default());

        let report = orchestrator.run(&[server("rtc1")]).unwrap();

        assert!(report.status().is_success());
        let calls = rtc1.calls();
        assert_eq!(calls.first(), Some(&Call::Connect));
        assert_eq!(calls.last(), Some(&Call::Disconnect));
        assert_eq!(
            rtc1.members(&Construct::permission("JazzAdmins")),
            MemberSet::from([Identity::from("alice")])
        );
    }

    #[test]
    fn test_transient_connect_failure_retried() {
        let directory = InMemoryDirectory::new().with_group("G-Admins", &["alice"]);
        let connector = InMemoryConnector::new()
            .with_server("rtc1", InMemoryServer::new())
            .with_transient_failures("rtc1", 1);
        let options = SyncOptions {
            retry: crate::retry::RetryConfig::new(3, std::time::Duration::from_millis(1), 1.0),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(&directory, &connector, options);

        let report = orchestrator.run(&[server("rtc1")]).unwrap();

        assert!(report.status().is_success());
        assert_eq!(connector.attempts("rtc1"), 2);
    }
}
