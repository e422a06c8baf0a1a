use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dirsync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Reconcile collaboration server access with LDAP directory groups",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (JSON or TOML)
    #[arg(short, long, global = true, env = "DIRSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Converge server access with the directory
    Sync(SyncArgs),

    /// Show what sync would change, without writing
    Diff(DiffArgs),

    /// Check the configuration without contacting anything
    Validate,

    /// Resolve a directory group and list its members
    Lookup {
        /// Group DN or name
        group: String,

        /// Show display attributes of each member
        #[arg(short, long)]
        describe: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Sync / Diff
// ============================================================================

/// Options shared by `sync` and `diff`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Only this server or stage: `SERVER`, `STAGE` or `SERVER.STAGE`
    ///
    /// STAGE is one of `permissions`, `licenses`, `roles`.
    #[arg(short, long)]
    pub target: Option<String>,

    /// Number of servers reconciled concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Log display attributes of users as they change
    #[arg(long)]
    pub describe_users: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Compute and report changes without writing them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Permit revoking every holder of a construct whose groups are empty
    #[arg(long)]
    pub allow_empty: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DiffArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_flags() {
        let cli = Cli::parse_from([
            "dirsync", "-vv", "sync", "--dry-run", "--jobs", "4", "--target", "rtc1.licenses",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Sync(args) => {
                assert!(args.dry_run);
                assert!(!args.allow_empty);
                assert_eq!(args.run.jobs, Some(4));
                assert_eq!(args.run.target.as_deref(), Some("rtc1.licenses"));
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["dirsync", "validate", "-c", "/tmp/dirsync.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/dirsync.toml")));
        assert!(matches!(cli.command, Commands::Validate));
    }
}
