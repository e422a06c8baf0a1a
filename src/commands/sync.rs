use anyhow::Result;
use log::warn;
use reconcile::{Orchestrator, RunStatus, SyncOptions, SyncPlan};
use serverkit::HttpConnector;

use crate::Context;
use crate::cli::{DiffArgs, RunArgs, SyncArgs};
use crate::commands::{connect_directory, load_config};
use crate::config::AppConfig;
use crate::progress::SpinnerProgress;
use crate::report;
use crate::secrets::{self, Prompt};
use crate::ui;

/// `dirsync sync`
pub fn run(ctx: &Context, args: SyncArgs) -> Result<RunStatus> {
    execute(ctx, &args.run, args.dry_run, args.allow_empty)
}

/// `dirsync diff`: a dry-run sync
pub fn diff(ctx: &Context, args: DiffArgs) -> Result<RunStatus> {
    execute(ctx, &args.run, true, false)
}

/// Engine options from the config file, overridden by command-line flags
fn options(config: &AppConfig, run: &RunArgs, dry_run: bool, allow_empty: bool) -> SyncOptions {
    let mut options = config.sync_options();
    options.dry_run = dry_run;
    if let Some(jobs) = run.jobs {
        options.jobs = jobs.max(1);
    }
    options.allow_empty_desired |= allow_empty;
    options.describe_users |= run.describe_users;
    options
}

fn execute(ctx: &Context, run: &RunArgs, dry_run: bool, allow_empty: bool) -> Result<RunStatus> {
    let (mut config, path) = load_config(ctx)?;
    config.validate()?;
    let plan = SyncPlan::from_target(run.target.as_deref())?;
    let options = options(&config, run, dry_run, allow_empty);

    if !ctx.quiet {
        ui::header(if dry_run {
            "Directory Sync (dry run)"
        } else {
            "Directory Sync"
        });
        ui::kv("Config", &path.display().to_string());
        ui::kv("Directory", &config.directory.url);
        ui::kv("Servers", &config.servers.len().to_string());
        if let Some(target) = &run.target {
            ui::kv("Target", target);
        }
        if options.jobs > 1 {
            ui::kv("Jobs", &options.jobs.to_string());
        }
        println!();
    }

    secrets::resolve_all(&mut config, &plan, Prompt::detect())?;
    let directory = connect_directory(&config)?;
    let connector = HttpConnector::new(config.server_timeout());
    let orchestrator = Orchestrator::new(&directory, &connector, options).with_plan(plan);

    let report = if ctx.quiet {
        orchestrator.run(&config.servers)?
    } else {
        let mut progress = SpinnerProgress::new();
        orchestrator.run_with_progress(&config.servers, &mut progress)?
    };

    if let Err(e) = directory.close() {
        warn!("Failed to unbind from directory: {e}");
    }

    if !ctx.quiet {
        report::display_outcomes(&report, dry_run);
    }
    report::display_totals(&report, dry_run);

    let mut status = report.status();
    if let Some(report_path) = &run.report {
        match report::write_json(&report, dry_run, report_path) {
            Ok(()) => {
                if !ctx.quiet {
                    ui::success(&format!("Report written to {}", report_path.display()));
                }
            }
            Err(e) => {
                ui::error(&format!("{e:#}"));
                status = RunStatus::SyncFailures;
            }
        }
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    fn config() -> AppConfig {
        AppConfig::parse(
            r#"{
                "directory": { "url": "ldap://localhost", "base_dn": "o=example" },
                "servers": [{ "name": "rtc1", "url": "https://rtc1.example.com" }],
                "options": { "jobs": 2, "describe_users": false }
            }"#,
            ConfigFormat::Json,
        )
        .unwrap()
    }

    #[test]
    fn test_flags_override_config() {
        let run = RunArgs {
            jobs: Some(8),
            describe_users: true,
            ..RunArgs::default()
        };
        let options = options(&config(), &run, true, true);

        assert!(options.dry_run);
        assert_eq!(options.jobs, 8);
        assert!(options.allow_empty_desired);
        assert!(options.describe_users);
    }

    #[test]
    fn test_config_defaults_without_flags() {
        let options = options(&config(), &RunArgs::default(), false, false);

        assert!(!options.dry_run);
        assert_eq!(options.jobs, 2);
        assert!(!options.allow_empty_desired);
    }

    #[test]
    fn test_zero_jobs_flag_runs_one_at_a_time() {
        let run = RunArgs {
            jobs: Some(0),
            ..RunArgs::default()
        };
        assert_eq!(options(&config(), &run, false, false).jobs, 1);
    }
}
