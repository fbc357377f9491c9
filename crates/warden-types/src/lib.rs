use std::{collections::BTreeMap, fmt, path::PathBuf, time::Duration, time::SystemTime};

use serde::Serialize;

/// Default host probed by a health check when the configuration names none.
pub const DEFAULT_HEALTH_HOST: &str = "127.0.0.1";

/// Whether `name` can be used as a service name.
///
/// Names double as registry marker file names, so they are restricted to
/// ASCII alphanumerics, `_`, `-` and `.`, and may not start with a dot.
#[must_use]
pub fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Readiness probe protocol. Only TCP reachability is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl HealthCheck {
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

/// A supervised service as declared by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    /// Program followed by its arguments. Never empty.
    pub command: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub log_path: PathBuf,
    pub env: BTreeMap<String, String>,
    pub health_check: Option<HealthCheck>,
    pub depends_on: Vec<String>,
    /// Overrides the supervisor-wide startup timeout for this service.
    pub startup_timeout: Option<Duration>,
}

impl ServiceSpec {
    /// Minimal spec with no dependencies, health check, or environment.
    #[must_use]
    pub fn new(name: impl Into<String>, command: Vec<String>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            command,
            working_dir: None,
            log_path: log_path.into(),
            env: BTreeMap::new(),
            health_check: None,
            depends_on: Vec::new(),
            startup_timeout: None,
        }
    }

    #[must_use]
    pub fn with_health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = Some(health_check);
        self
    }

    #[must_use]
    pub fn with_deps(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| (*d).to_owned()).collect();
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Services of one deployment profile, dependencies first.
///
/// The ordering is established by `warden-config` when the topology is
/// loaded; the orchestrator starts services front to back and stops them
/// back to front.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topology {
    pub profile: Option<String>,
    services: Vec<ServiceSpec>,
}

impl Topology {
    /// Builds a topology from services that are already in dependency order.
    #[must_use]
    pub fn new(profile: Option<String>, services: Vec<ServiceSpec>) -> Self {
        Self { profile, services }
    }

    #[must_use]
    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    pub fn start_order(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.iter()
    }

    pub fn stop_order(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.iter().rev()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }
}

/// Timing knobs of the supervisor. Every wait it performs is bounded by one
/// of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Total time a freshly launched service gets to become healthy.
    pub startup: Duration,
    /// Delay between two readiness probes.
    pub poll_interval: Duration,
    /// Time between the graceful signal and the forced one.
    pub graceful_stop: Duration,
    /// Time to wait for exit confirmation after the forced signal.
    pub forced_stop: Duration,
    /// Upper bound for a single TCP connect attempt.
    pub connect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            graceful_stop: Duration::from_secs(5),
            forced_stop: Duration::from_secs(2),
            connect: Duration::from_secs(1),
        }
    }
}

/// A tracked process as persisted by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub service: String,
    pub pid: u32,
    pub started_at: SystemTime,
}

impl ProcessRecord {
    #[must_use]
    pub fn new(service: impl Into<String>, pid: u32) -> Self {
        Self {
            service: service.into(),
            pid,
            started_at: SystemTime::now(),
        }
    }
}

/// Health classification; recomputed on every query, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Unreachable,
    Reachable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Unknown => write!(f, "unknown"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
            HealthStatus::Reachable => write!(f, "reachable"),
        }
    }
}

/// Lifecycle state of a service as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopping => write!(f, "stopping"),
        }
    }
}
