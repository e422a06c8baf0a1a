//! Terminal progress for a sync run, built on indicatif

use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{ConstructReport, ProgressCallback, SyncOutcome};
use std::time::Duration;

use crate::ui::Tone;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {prefix:.bold} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// One spinner per server when sequential, one for the whole run when parallel
pub struct SpinnerProgress {
    spinner: Option<ProgressBar>,
    parallel: bool,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        Self {
            spinner: None,
            parallel: false,
        }
    }

    fn start(&mut self, prefix: String, message: &str) {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.set_prefix(prefix);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn println(&self, line: String) {
        match &self.spinner {
            Some(spinner) => spinner.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl Default for SpinnerProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for SpinnerProgress {
    fn on_run_start(&mut self, servers: usize, parallel: bool) {
        self.parallel = parallel;
        if parallel {
            self.start(
                format!("{servers} servers"),
                "reconciling in parallel...",
            );
        }
    }

    fn on_server_start(&mut self, server: &str) {
        if !self.parallel {
            self.start(server.to_string(), "connecting...");
        }
    }

    fn on_construct_complete(&mut self, _server: &str, report: &ConstructReport) {
        if let Some(spinner) = &self.spinner
            && !self.parallel
        {
            spinner.set_message(report.construct.to_string());
        }
    }

    fn on_server_complete(&mut self, outcome: &SyncOutcome) {
        let tone = if outcome.is_failure() {
            Tone::Error
        } else {
            Tone::Success
        };
        let line = tone.line(&outcome.server);

        if self.parallel {
            self.println(line);
        } else if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
            eprintln!("{line}");
        }
    }

    fn on_run_complete(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}
