//! Lifecycle engine of the `warden` supervisor.

mod error;
mod launcher;
mod orchestrator;
pub mod platform;
mod probe;
pub mod registry;
mod shutdown;
pub mod wait;

pub use error::{HealthCheckFailed, LaunchError, RegistryError, StartFailure, StopError};
pub use launcher::Launcher;
pub use orchestrator::{
    Orchestrator, OrphanMarker, ServiceOutcome, ServiceStatus, ServiceStop, StartError,
    StartReport, StatusReport, StopReport,
};
#[cfg(unix)]
pub use platform::UnixProcessControl;
pub use platform::{CommandSpec, ProcessControl, Termination};
pub use probe::{PortProbe, Prober, TcpProbe};
pub use registry::{FileRegistry, MemoryRegistry, Registry};
pub use shutdown::{ShutdownController, StopOutcome};
