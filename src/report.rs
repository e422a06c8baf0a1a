//! Run display and the JSON report file

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use reconcile::{
    ConstructReport, DiffSummary, Error, Identity, RunStatus, Stage, SyncOutcome, SyncReport,
    group_by_stage,
};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::ui::Tone;

const RULE: &str = "─────────────────────────────────────────────────────";

/// Names shown before eliding the rest of a list
const MAX_LISTED: usize = 8;

fn stage_title(stage: Stage) -> &'static str {
    match stage {
        Stage::Permissions => "Permission groups",
        Stage::Licenses => "Licenses",
        Stage::Roles => "Project and team areas",
    }
}

/// Display one box per server with every change made (or planned)
pub fn display_outcomes(report: &SyncReport, dry_run: bool) {
    for outcome in &report.outcomes {
        display_outcome(outcome, dry_run);
    }
}

fn display_outcome(outcome: &SyncOutcome, dry_run: bool) {
    let title = if dry_run {
        format!("{} (dry run)", outcome.server)
    } else {
        outcome.server.clone()
    };

    println!();
    println!("┌─ {} {}", title.bold(), "─".repeat(20));
    println!("│");

    if let Some(error) = &outcome.error {
        println!("│  {} {}", Tone::Error.symbol(), error);
        println!("│  {}", error.category().advice().dimmed());
        println!("│");
        println!("└{RULE}");
        return;
    }

    let mut changed = false;
    for (stage, reports) in group_by_stage(&outcome.reports) {
        let visible: Vec<&ConstructReport> = reports
            .into_iter()
            .filter(|r| !r.is_unchanged())
            .collect();
        if visible.is_empty() {
            continue;
        }
        changed = true;

        println!("│ {}", stage_title(stage).bold());
        for construct in visible {
            display_construct(construct);
        }
        println!("│");
    }

    if !changed {
        println!("│  {} Already in sync", Tone::Success.symbol());
        println!("│");
    }

    let summary = DiffSummary::from_reports(&outcome.reports);
    println!("├{RULE}");
    println!("│ {}", summary_line(&summary, dry_run));
    println!("└{RULE}");
}

fn display_construct(report: &ConstructReport) {
    println!("│   {}", report.construct.to_string().cyan());

    if !report.granted.is_empty() {
        println!("│     {} {}", "+".green(), list_ids(&report.granted));
    }
    if !report.revoked.is_empty() {
        println!("│     {} {}", "-".red(), list_ids(&report.revoked));
    }
    for failure in &report.failures {
        println!(
            "│     {} {} {}: {}",
            Tone::Error.symbol(),
            failure.action,
            failure.identity,
            failure.cause.dimmed()
        );
    }

    match &report.error {
        Some(error @ (Error::CapacityExceeded { .. } | Error::UnsafeEmptyDesiredSet { .. })) => {
            println!("│     {} {}", Tone::Warn.symbol(), error);
        }
        Some(Error::AncestorFailed { area }) => {
            println!("│     {} skipped: {} failed", "·".dimmed(), area);
        }
        Some(error) => println!("│     {} {}", Tone::Error.symbol(), error),
        None => {}
    }
}

/// `alice, bob, carol (+4 more)`
pub fn list_ids(ids: &[Identity]) -> String {
    let shown: Vec<&str> = ids.iter().take(MAX_LISTED).map(Identity::as_str).collect();
    let mut line = shown.join(", ");
    if ids.len() > MAX_LISTED {
        line.push_str(&format!(" (+{} more)", ids.len() - MAX_LISTED));
    }
    line
}

fn summary_line(summary: &DiffSummary, dry_run: bool) -> String {
    let (add, remove) = if dry_run {
        ("to grant", "to revoke")
    } else {
        ("granted", "revoked")
    };
    let mut line = format!(
        "Summary: {} {}, {} {}, {} unchanged",
        summary.additions.to_string().green(),
        add,
        summary.removals.to_string().red(),
        remove,
        summary.unchanged
    );
    if summary.refused > 0 {
        line.push_str(&format!(", {} refused", summary.refused.to_string().yellow()));
    }
    if summary.failed > 0 {
        line.push_str(&format!(", {} failed", summary.failed.to_string().red()));
    }
    line
}

/// Final line after every server box
pub fn display_totals(report: &SyncReport, dry_run: bool) {
    let failed: Vec<&str> = report.failed().map(|o| o.server.as_str()).collect();
    let summary = report.summary();

    println!();
    println!("{}", summary_line(&summary, dry_run));
    if failed.is_empty() {
        println!(
            "{} {} server(s) reconciled",
            Tone::Success.symbol(),
            report.outcomes.len()
        );
    } else {
        eprintln!(
            "{} {} of {} server(s) had failures: {}",
            Tone::Error.symbol(),
            failed.len(),
            report.outcomes.len(),
            failed.join(", ")
        );
    }
}

// ============================================================================
// JSON Report
// ============================================================================

#[derive(Serialize)]
struct RunReport<'a> {
    generated_at: DateTime<Utc>,
    dry_run: bool,
    status: RunStatus,
    summary: DiffSummary,
    outcomes: &'a [SyncOutcome],
}

/// Write the run as pretty JSON
pub fn write_json(report: &SyncReport, dry_run: bool, path: &Path) -> Result<()> {
    let run = RunReport {
        generated_at: Utc::now(),
        dry_run,
        status: report.status(),
        summary: report.summary(),
        outcomes: &report.outcomes,
    };
    let content = serde_json::to_string_pretty(&run)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))?;
    Ok(())
}
