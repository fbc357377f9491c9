//! OS primitives the supervisor is built on.

#[cfg(test)]
mod fake;
#[cfg(unix)]
mod unix;

use std::{collections::BTreeMap, fs::File, path::PathBuf};

use warden_types::ServiceSpec;

#[cfg(test)]
pub use fake::FakeControl;
#[cfg(unix)]
pub use unix::UnixProcessControl;

/// Two-phase termination request.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Termination {
    /// Ask the process to exit (`SIGTERM` on Unix).
    Graceful,
    /// Compel the process to exit (`SIGKILL` on Unix).
    Forced,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub cmd: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl From<&ServiceSpec> for CommandSpec {
    fn from(spec: &ServiceSpec) -> Self {
        Self {
            name: spec.name.clone(),
            cmd: spec.command.clone(),
            cwd: spec.working_dir.clone(),
            env: spec.env.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait ProcessControl: Send + Sync {
    /// Spawn a process that outlives the supervisor, with stdout and stderr
    /// both written to `log`. Returns its pid.
    async fn spawn_detached(&self, spec: &CommandSpec, log: File) -> std::io::Result<u32>;
    /// Whether a process with this pid exists.
    async fn is_alive(&self, pid: u32) -> bool;
    /// Deliver a termination request. A process that is already gone is not
    /// an error.
    async fn terminate(&self, pid: u32, how: Termination) -> std::io::Result<()>;
}
