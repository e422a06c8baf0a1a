mod cli;
mod commands;
mod config;
mod progress;
mod report;
mod secrets;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use reconcile::RunStatus;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
    };

    let result = match cli.command {
        Commands::Sync(args) => commands::sync::run(&ctx, args),
        Commands::Diff(args) => commands::sync::diff(&ctx, args),
        Commands::Validate => commands::validate::run(&ctx),
        Commands::Lookup { group, describe } => commands::lookup::run(&ctx, &group, describe),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "dirsync", &mut io::stdout());
            Ok(RunStatus::Success)
        }
    };

    // Anything that fails before outcomes exist is a setup problem
    let status = result.unwrap_or_else(|e| {
        ui::error(&format!("{e:#}"));
        RunStatus::ConfigError
    });
    ExitCode::from(status.exit_code())
}
