use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::{fs, io::AsyncWriteExt};
use warden_types::{ProcessRecord, ServiceSpec};

use crate::{
    error::LaunchError,
    platform::{CommandSpec, ProcessControl},
    registry::Registry,
};

/// Spawns services detached from the supervisor and records their pids.
pub struct Launcher<'a> {
    registry: &'a dyn Registry,
    control: &'a dyn ProcessControl,
}

impl<'a> Launcher<'a> {
    #[must_use]
    pub fn new(registry: &'a dyn Registry, control: &'a dyn ProcessControl) -> Self {
        Self { registry, control }
    }

    /// Launches `spec` with its output appended to `spec.log_path`.
    ///
    /// The caller is expected to have checked that the service is not
    /// already running.
    ///
    /// # Errors
    ///
    /// Fails without touching the registry if the log cannot be opened or the
    /// process cannot be spawned. Fails with [`LaunchError::Registry`] if the
    /// process is up but its marker could not be written.
    pub async fn start(&self, spec: &ServiceSpec) -> Result<ProcessRecord, LaunchError> {
        let Some(program) = spec.command.first() else {
            return Err(LaunchError::EmptyCommand {
                service: spec.name.clone(),
            });
        };

        let log = open_log(&spec.name, &spec.log_path)
            .await
            .map_err(|source| LaunchError::Log {
                service: spec.name.clone(),
                path: spec.log_path.clone(),
                source,
            })?;

        let pid = self
            .control
            .spawn_detached(&CommandSpec::from(spec), log)
            .await
            .map_err(|source| LaunchError::Spawn {
                service: spec.name.clone(),
                program: program.clone(),
                source,
            })?;
        tracing::info!("Launched `{}` as pid {pid}", spec.name);

        let record = ProcessRecord::new(&spec.name, pid);
        self.registry
            .put(&record)
            .await
            .map_err(|source| LaunchError::Registry {
                service: spec.name.clone(),
                pid,
                source,
            })?;

        Ok(record)
    }
}

/// Opens the log for appending, creating it and its directory if needed, and
/// writes the run banner.
async fn open_log(name: &str, path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    file.write_all(format!("==> warden: starting {name} at {now}\n").as_bytes())
        .await?;
    file.flush().await?;

    Ok(file.into_std().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{platform::FakeControl, registry::MemoryRegistry};

    fn spec(dir: &Path, name: &str) -> ServiceSpec {
        ServiceSpec::new(
            name,
            vec!["python".to_owned(), format!("{name}.py")],
            dir.join("logs").join(format!("{name}.log")),
        )
    }

    #[tokio::test]
    async fn records_the_spawned_pid() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MemoryRegistry::new();
        let control = FakeControl::new();
        let launcher = Launcher::new(&registry, &control);

        let record = launcher.start(&spec(dir.path(), "math")).await.unwrap();

        assert_eq!(record.service, "math");
        assert_eq!(registry.get("math").await.unwrap(), Some(record.clone()));
        assert_eq!(control.alive_pids(), vec![record.pid]);
    }

    #[tokio::test]
    async fn log_is_appended_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MemoryRegistry::new();
        let control = FakeControl::new();
        let launcher = Launcher::new(&registry, &control);
        let math = spec(dir.path(), "math");

        launcher.start(&math).await.unwrap();
        launcher.start(&math).await.unwrap();

        let log = std::fs::read_to_string(&math.log_path).unwrap();
        let banners: Vec<_> = log.lines().collect();
        assert_eq!(banners.len(), 2);
        assert!(banners
            .iter()
            .all(|l| l.starts_with("==> warden: starting math at ")));
    }

    #[tokio::test]
    async fn spawn_failure_leaves_registry_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MemoryRegistry::new();
        let control = FakeControl::new();
        control.fail_spawn("math");
        let launcher = Launcher::new(&registry, &control);

        let err = launcher.start(&spec(dir.path(), "math")).await.unwrap_err();

        assert!(matches!(err, LaunchError::Spawn { ref program, .. } if program == "python"));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MemoryRegistry::new();
        let control = FakeControl::new();
        let launcher = Launcher::new(&registry, &control);
        let mut math = spec(dir.path(), "math");
        math.command.clear();

        let err = launcher.start(&math).await.unwrap_err();

        assert!(matches!(err, LaunchError::EmptyCommand { .. }));
        assert!(control.spawned().is_empty());
        assert!(!math.log_path.exists());
    }

    #[tokio::test]
    async fn unwritable_log_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MemoryRegistry::new();
        let control = FakeControl::new();
        let launcher = Launcher::new(&registry, &control);
        // A regular file where the log directory should be.
        std::fs::write(dir.path().join("logs"), b"").unwrap();

        let err = launcher.start(&spec(dir.path(), "math")).await.unwrap_err();

        assert!(matches!(err, LaunchError::Log { .. }));
        assert!(control.spawned().is_empty());
    }
}
