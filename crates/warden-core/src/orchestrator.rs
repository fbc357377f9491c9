//! Dependency-ordered start, stop and status over a [`Topology`].

use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use thiserror::Error;
use warden_types::{HealthStatus, ProcessRecord, ServiceSpec, ServiceState, Timeouts, Topology};

use crate::{
    error::{RegistryError, Result, StartFailure, StopError},
    launcher::Launcher,
    platform::ProcessControl,
    probe::{PortProbe, Prober},
    registry::Registry,
    shutdown::{ShutdownController, StopOutcome},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceOutcome {
    pub name: String,
    pub pid: u32,
    pub state: ServiceState,
    /// `false` when the service was already running and only went through
    /// the health gate.
    pub launched: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub profile: Option<String>,
    pub services: Vec<ServiceOutcome>,
}

impl StartReport {
    /// Names of the services this run actually spawned.
    pub fn launched(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|s| s.launched)
            .map(|s| s.name.as_str())
    }
}

/// A service did not reach `Running`; nothing after it was started.
#[derive(Debug, Error)]
#[error("service `{service}` failed to start")]
pub struct StartError {
    pub service: String,
    #[source]
    pub cause: StartFailure,
    /// Services that were running before the failure.
    pub report: StartReport,
}

#[derive(Debug)]
pub struct ServiceStop {
    pub name: String,
    pub outcome: std::result::Result<StopOutcome, StopError>,
}

#[derive(Debug, Default)]
pub struct StopReport {
    pub profile: Option<String>,
    pub services: Vec<ServiceStop>,
}

impl StopReport {
    pub fn errors(&self) -> impl Iterator<Item = (&str, &StopError)> {
        self.services
            .iter()
            .filter_map(|s| s.outcome.as_ref().err().map(|e| (s.name.as_str(), e)))
    }

    /// Whether some marker could not be removed and is still on disk.
    #[must_use]
    pub fn has_registry_errors(&self) -> bool {
        self.errors()
            .any(|(_, err)| matches!(err, StopError::Registry { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub pid: Option<u32>,
    pub alive: bool,
    pub health: HealthStatus,
    pub state: ServiceState,
    /// Unix seconds.
    pub started_at: Option<u64>,
    pub log_path: PathBuf,
}

/// A marker for a service outside the inspected topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanMarker {
    pub name: String,
    pub pid: u32,
    pub alive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub profile: Option<String>,
    pub services: Vec<ServiceStatus>,
    pub orphans: Vec<OrphanMarker>,
}

pub struct Orchestrator<'a> {
    registry: &'a dyn Registry,
    control: &'a dyn ProcessControl,
    ports: &'a dyn PortProbe,
    timeouts: Timeouts,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(
        registry: &'a dyn Registry,
        control: &'a dyn ProcessControl,
        ports: &'a dyn PortProbe,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            registry,
            control,
            ports,
            timeouts,
        }
    }

    fn prober(&self) -> Prober<'a> {
        Prober::new(self.control, self.ports, self.timeouts.connect)
    }

    /// Brings every service of `topology` to `Running`, dependencies first.
    ///
    /// Services that are already alive are not relaunched but must still pass
    /// their health check.
    ///
    /// # Errors
    ///
    /// Stops at the first service that cannot be launched or does not become
    /// healthy. A launched but unhealthy process is left running and tracked.
    #[tracing::instrument(skip_all, fields(profile = ?topology.profile))]
    pub async fn start(&self, topology: &Topology) -> std::result::Result<StartReport, StartError> {
        let mut report = StartReport {
            profile: topology.profile.clone(),
            services: Vec::with_capacity(topology.len()),
        };

        for spec in topology.start_order() {
            match self.start_one(spec).await {
                Ok(outcome) => report.services.push(outcome),
                Err(cause) => {
                    tracing::warn!("`{}` failed to start: {cause}", spec.name);
                    return Err(StartError {
                        service: spec.name.clone(),
                        cause,
                        report,
                    });
                }
            }
        }

        Ok(report)
    }

    async fn start_one(&self, spec: &ServiceSpec) -> std::result::Result<ServiceOutcome, StartFailure> {
        let (record, launched) = match self.running_record(&spec.name).await? {
            Some(record) => {
                tracing::info!("`{}` is already running as pid {}", spec.name, record.pid);
                (record, false)
            }
            None => {
                tracing::info!("`{}`: {} -> {}", spec.name, ServiceState::Stopped, ServiceState::Starting);
                (Launcher::new(self.registry, self.control).start(spec).await?, true)
            }
        };

        let startup = spec.startup_timeout.unwrap_or(self.timeouts.startup);
        self.prober()
            .wait_healthy(spec, record.pid, startup, self.timeouts.poll_interval)
            .await?;
        tracing::info!("`{}` is {}", spec.name, ServiceState::Running);

        Ok(ServiceOutcome {
            name: spec.name.clone(),
            pid: record.pid,
            state: ServiceState::Running,
            launched,
        })
    }

    /// The record for `name` if its process is alive. Stale markers are
    /// dropped on the way.
    async fn running_record(&self, name: &str) -> Result<Option<ProcessRecord>> {
        if !self.registry.is_alive(name, self.control).await? {
            return Ok(None);
        }
        self.registry.get(name).await
    }

    /// Stops every service of `topology`, dependents first. Failures are
    /// collected, never short-circuit.
    #[tracing::instrument(skip_all, fields(profile = ?topology.profile))]
    pub async fn stop(&self, topology: &Topology) -> StopReport {
        let shutdown = ShutdownController::new(self.registry, self.control, self.timeouts.forced_stop);
        let mut report = StopReport {
            profile: topology.profile.clone(),
            services: Vec::with_capacity(topology.len()),
        };

        for spec in topology.stop_order() {
            if let Ok(Some(record)) = self.registry.get(&spec.name).await {
                tracing::info!(
                    "`{}` (pid {}): {} -> {}",
                    spec.name,
                    record.pid,
                    ServiceState::Running,
                    ServiceState::Stopping
                );
            }
            let outcome = shutdown.stop(&spec.name, self.timeouts.graceful_stop).await;
            match &outcome {
                Ok(StopOutcome::NotTracked) => tracing::debug!("`{}` is not running", spec.name),
                Ok(outcome) => tracing::info!("`{}` is {}: {outcome}", spec.name, ServiceState::Stopped),
                Err(err) => tracing::warn!("Stopping `{}`: {err}", spec.name),
            }
            report.services.push(ServiceStop {
                name: spec.name.clone(),
                outcome,
            });
        }

        report
    }

    /// Inspects `topology` without changing anything: markers of dead
    /// processes are reported, not removed.
    ///
    /// # Errors
    ///
    /// Fails if the registry cannot be read.
    #[tracing::instrument(skip_all, fields(profile = ?topology.profile))]
    pub async fn status(&self, topology: &Topology) -> Result<StatusReport> {
        let prober = self.prober();
        let mut report = StatusReport {
            profile: topology.profile.clone(),
            services: Vec::with_capacity(topology.len()),
            orphans: Vec::new(),
        };

        for spec in topology.services() {
            let record = match self.registry.get(&spec.name).await {
                Ok(record) => record,
                Err(err @ RegistryError::Corrupt { .. }) => {
                    tracing::warn!("{err}");
                    None
                }
                Err(err) => return Err(err),
            };

            let pid = record.as_ref().map(|r| r.pid);
            let alive = match pid {
                Some(pid) => prober.is_process_alive(pid).await,
                None => false,
            };
            let health = prober.health(spec, pid.filter(|_| alive)).await;

            report.services.push(ServiceStatus {
                name: spec.name.clone(),
                pid,
                alive,
                health,
                state: derive_state(alive, spec, health),
                started_at: record.map(|r| unix_secs(r.started_at)),
                log_path: spec.log_path.clone(),
            });
        }

        for record in self.registry.list().await? {
            if topology.contains(&record.service) {
                continue;
            }
            report.orphans.push(OrphanMarker {
                alive: prober.is_process_alive(record.pid).await,
                name: record.service,
                pid: record.pid,
            });
        }

        Ok(report)
    }
}

/// A live process whose port is still closed has not finished starting.
fn derive_state(alive: bool, spec: &ServiceSpec, health: HealthStatus) -> ServiceState {
    if !alive {
        return ServiceState::Stopped;
    }
    match (&spec.health_check, health) {
        (Some(_), HealthStatus::Unreachable) => ServiceState::Starting,
        _ => ServiceState::Running,
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}
