use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// CLI for warden
#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Local multi-process service supervisor")]
pub struct Cli {
    /// Path to the configuration file (TOML)
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// More diagnostics on stderr (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which part of the configuration to act on.
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
    /// Profile from the `[profiles]` table; every service when omitted
    pub profile: Option<String>,

    /// Act on this service and its dependencies only (repeatable)
    #[arg(short, long = "service", value_name = "NAME")]
    pub services: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start services in dependency order, waiting for each to become healthy
    Start(Selection),

    /// Stop services in reverse dependency order
    Stop(Selection),

    /// Show tracked pids, liveness and health
    Status {
        #[command(flatten)]
        selection: Selection,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the end of a service log
    Logs {
        service: String,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}
