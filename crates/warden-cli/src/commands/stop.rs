use std::process::ExitCode;

use anyhow::Result;
use warden_config::Config;
use warden_core::{
    FileRegistry, Orchestrator, StopError, StopOutcome, StopReport, TcpProbe, UnixProcessControl,
};

use crate::{config::Selection, logger::Logger};

pub async fn stop(config: &Config, selection: &Selection, logger: &mut Logger) -> Result<ExitCode> {
    let topology = super::select(config, selection)?;
    let registry = FileRegistry::new(&config.state_dir);
    let control = UnixProcessControl::new();
    let orchestrator = Orchestrator::new(&registry, &control, &TcpProbe, config.timeouts);

    let report = orchestrator.stop(&topology).await;
    for service in &report.services {
        match &service.outcome {
            Ok(StopOutcome::NotTracked) => {}
            Ok(outcome @ StopOutcome::Unconfirmed) => {
                logger.warn(&service.name, &outcome.to_string());
            }
            Ok(outcome) => logger.service(&service.name, &outcome.to_string()),
            Err(err @ StopError::Registry { .. }) => logger.error(&service.name, &err.to_string()),
            Err(err) => logger.warn(&service.name, &err.to_string()),
        }
    }

    Ok(ExitCode::from(exit_status(&report)))
}

/// Warnings are not failures; a marker left on disk is.
fn exit_status(report: &StopReport) -> u8 {
    u8::from(report.has_registry_errors())
}
