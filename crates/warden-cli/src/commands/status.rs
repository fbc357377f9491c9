use std::{fmt::Write as _, process::ExitCode};

use anyhow::{Context, Result};
use warden_config::Config;
use warden_core::{FileRegistry, Orchestrator, StatusReport, TcpProbe, UnixProcessControl};

use crate::{config::Selection, logger::Logger};

pub async fn status(
    config: &Config,
    selection: &Selection,
    json: bool,
    logger: &mut Logger,
) -> Result<ExitCode> {
    let topology = super::select(config, selection)?;
    let registry = FileRegistry::new(&config.state_dir);
    let control = UnixProcessControl::new();
    let orchestrator = Orchestrator::new(&registry, &control, &TcpProbe, config.timeouts);

    let report = orchestrator
        .status(&topology)
        .await
        .with_context(|| format!("cannot read {}", registry.dir().display()))?;

    if json {
        logger.raw(&serde_json::to_string_pretty(&report)?);
    } else {
        logger.raw(&render_table(&report));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_table(report: &StatusReport) -> String {
    let width = report
        .services
        .iter()
        .map(|s| s.name.len())
        .chain(report.orphans.iter().map(|o| o.name.len()))
        .chain(std::iter::once("SERVICE".len()))
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>7}  {:<8}  {:<11}  LOG",
        "SERVICE", "PID", "STATE", "HEALTH"
    );
    for service in &report.services {
        let pid = match (service.pid, service.alive) {
            (Some(pid), true) => pid.to_string(),
            (Some(pid), false) => format!("{pid}?"),
            (None, _) => "-".to_owned(),
        };
        let _ = writeln!(
            out,
            "{:<width$}  {:>7}  {:<8}  {:<11}  {}",
            service.name,
            pid,
            service.state.to_string(),
            service.health.to_string(),
            service.log_path.display()
        );
    }
    for orphan in &report.orphans {
        let state = if orphan.alive { "orphan" } else { "stale" };
        let _ = writeln!(out, "{:<width$}  {:>7}  {state}", orphan.name, orphan.pid);
    }
    out.truncate(out.trim_end().len());
    out
}
