use std::process::ExitCode;

use anyhow::Result;
use warden_config::Config;
use warden_core::{FileRegistry, Orchestrator, TcpProbe, UnixProcessControl};

use crate::{config::Selection, logger::Logger};

pub async fn start(config: &Config, selection: &Selection, logger: &mut Logger) -> Result<ExitCode> {
    let topology = super::select(config, selection)?;
    let registry = FileRegistry::new(&config.state_dir);
    let control = UnixProcessControl::new();
    let orchestrator = Orchestrator::new(&registry, &control, &TcpProbe, config.timeouts);

    match orchestrator.start(&topology).await {
        Ok(report) => {
            for service in &report.services {
                let how = if service.launched { "started" } else { "already running" };
                logger.service(&service.name, &format!("{how} (pid {})", service.pid));
            }
            logger.system(&format!("{} services running", report.services.len()));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            for service in &err.report.services {
                logger.service(&service.name, &format!("running (pid {})", service.pid));
            }
            logger.error(&err.service, &format!("{:#}", anyhow::Error::new(err.cause)));
            let skipped: Vec<_> = topology
                .start_order()
                .map(|s| s.name.as_str())
                .skip_while(|name| *name != err.service)
                .skip(1)
                .collect();
            if !skipped.is_empty() {
                logger.system(&format!("not started: {}", skipped.join(", ")));
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
