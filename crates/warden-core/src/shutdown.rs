use std::{fmt, time::Duration};

use serde::Serialize;

use crate::{
    error::StopError,
    platform::{ProcessControl, Termination},
    registry::Registry,
    wait::wait_until,
};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// No marker existed.
    NotTracked,
    /// The marker pointed at a process that was already gone.
    AlreadyExited,
    /// Exited after the graceful signal.
    Graceful,
    /// Exited after the forced signal.
    Forced,
    /// Still present after the forced signal. The marker was dropped anyway.
    Unconfirmed,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopOutcome::NotTracked => "not running",
            StopOutcome::AlreadyExited => "already exited",
            StopOutcome::Graceful => "stopped",
            StopOutcome::Forced => "killed",
            StopOutcome::Unconfirmed => "kill unconfirmed",
        };
        f.write_str(text)
    }
}

/// Two-phase termination of tracked services.
pub struct ShutdownController<'a> {
    registry: &'a dyn Registry,
    control: &'a dyn ProcessControl,
    forced_timeout: Duration,
}

impl<'a> ShutdownController<'a> {
    #[must_use]
    pub fn new(
        registry: &'a dyn Registry,
        control: &'a dyn ProcessControl,
        forced_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            control,
            forced_timeout,
        }
    }

    /// Stops the process tracked for `name`: graceful signal, up to
    /// `graceful_timeout` for it to exit, then the forced signal.
    ///
    /// The marker is removed whatever the process did.
    ///
    /// # Errors
    ///
    /// [`StopError::Signal`] if a signal could not be delivered and
    /// [`StopError::Corrupt`] if the marker was unreadable; the marker is
    /// removed in both cases. [`StopError::Registry`] if it could not be.
    pub async fn stop(
        &self,
        name: &str,
        graceful_timeout: Duration,
    ) -> Result<StopOutcome, StopError> {
        let record = match self.registry.get(name).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(StopOutcome::NotTracked),
            Err(source) => {
                tracing::warn!("Dropping unreadable marker for `{name}`: {source}");
                self.forget(name).await?;
                return Err(StopError::Corrupt {
                    service: name.to_owned(),
                    source,
                });
            }
        };
        let pid = record.pid;

        let outcome = match self.terminate(name, pid, graceful_timeout).await {
            Ok(outcome) => outcome,
            Err(source) => {
                self.forget(name).await?;
                return Err(StopError::Signal {
                    service: name.to_owned(),
                    pid,
                    source,
                });
            }
        };

        self.forget(name).await?;
        Ok(outcome)
    }

    async fn terminate(
        &self,
        name: &str,
        pid: u32,
        graceful_timeout: Duration,
    ) -> std::io::Result<StopOutcome> {
        if !self.control.is_alive(pid).await {
            tracing::debug!("`{name}` (pid {pid}) already exited");
            return Ok(StopOutcome::AlreadyExited);
        }

        tracing::debug!("Sending graceful signal to `{name}` (pid {pid})");
        self.control.terminate(pid, Termination::Graceful).await?;
        if self.exited(pid, graceful_timeout).await {
            return Ok(StopOutcome::Graceful);
        }

        tracing::info!(
            "`{name}` (pid {pid}) still running {graceful_timeout:?} after the graceful signal, killing"
        );
        self.control.terminate(pid, Termination::Forced).await?;
        if self.exited(pid, self.forced_timeout).await {
            return Ok(StopOutcome::Forced);
        }

        tracing::warn!("`{name}` (pid {pid}) is still present after the forced signal");
        Ok(StopOutcome::Unconfirmed)
    }

    async fn exited(&self, pid: u32, timeout: Duration) -> bool {
        wait_until(timeout, EXIT_POLL_INTERVAL, || async move {
            !self.control.is_alive(pid).await
        })
        .await
    }

    async fn forget(&self, name: &str) -> Result<(), StopError> {
        self.registry
            .remove(name)
            .await
            .map_err(|source| StopError::Registry {
                service: name.to_owned(),
                source,
            })
    }
}
