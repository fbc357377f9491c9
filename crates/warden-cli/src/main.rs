use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use warden_config::ConfigError;

mod commands;
mod config;
mod logger;

use crate::{
    config::{Cli, Commands},
    logger::Logger,
};

const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

/// Configuration problems exit with 2, everything else with 1.
fn exit_status(err: &anyhow::Error) -> u8 {
    if err.chain().any(|cause| cause.is::<ConfigError>()) {
        EXIT_CONFIG
    } else {
        1
    }
}

fn init_tracing(cli: &Cli) {
    let default = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let path = commands::resolve_config_path(cli.file.as_deref())?;
    commands::load_dotenv(&path);
    let config = commands::load(&path)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut logger = Logger::stdout();

    runtime.block_on(async {
        match &cli.command {
            Commands::Start(selection) => commands::start(&config, selection, &mut logger).await,
            Commands::Stop(selection) => commands::stop(&config, selection, &mut logger).await,
            Commands::Status { selection, json } => {
                commands::status(&config, selection, *json, &mut logger).await
            }
            Commands::Logs { service, lines } => {
                commands::logs(&config, service, *lines, &mut logger).await
            }
        }
    })
}
