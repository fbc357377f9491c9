//! Liveness and readiness checks.

use std::time::Duration;

use tokio::{net::TcpStream, time::Instant};
use warden_types::{HealthStatus, ServiceSpec};

use crate::{error::HealthCheckFailed, platform::ProcessControl, wait::wait_for};

#[async_trait::async_trait]
pub trait PortProbe: Send + Sync {
    /// Whether a TCP connection to `host:port` succeeds within `timeout`.
    async fn is_port_open(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Probes by opening (and immediately dropping) a real TCP connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

#[async_trait::async_trait]
impl PortProbe for TcpProbe {
    async fn is_port_open(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => {
                tracing::trace!("{host}:{port} refused: {err}");
                false
            }
            Err(_) => {
                tracing::trace!("{host}:{port} timed out after {timeout:?}");
                false
            }
        }
    }
}

/// Answers "is it up?" for a service, by pid and, when the service declares
/// a health check, by port.
pub struct Prober<'a> {
    control: &'a dyn ProcessControl,
    ports: &'a dyn PortProbe,
    connect_timeout: Duration,
}

impl<'a> Prober<'a> {
    #[must_use]
    pub fn new(
        control: &'a dyn ProcessControl,
        ports: &'a dyn PortProbe,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            control,
            ports,
            connect_timeout,
        }
    }

    /// OS-level existence check. Says nothing about which program owns the
    /// pid: a recycled pid reads as alive.
    pub async fn is_process_alive(&self, pid: u32) -> bool {
        self.control.is_alive(pid).await
    }

    pub async fn is_port_open(&self, host: &str, port: u16, timeout: Duration) -> bool {
        self.ports.is_port_open(host, port, timeout).await
    }

    /// One-shot classification. Services without a health check, or without
    /// a live process, are `Unknown`.
    pub async fn health(&self, spec: &ServiceSpec, pid: Option<u32>) -> HealthStatus {
        let Some(check) = &spec.health_check else {
            return HealthStatus::Unknown;
        };
        match pid {
            Some(pid) if self.is_process_alive(pid).await => {}
            _ => return HealthStatus::Unknown,
        }

        if self
            .is_port_open(&check.host, check.port, self.connect_timeout)
            .await
        {
            HealthStatus::Reachable
        } else {
            HealthStatus::Unreachable
        }
    }

    /// Blocks until `spec` is ready or `total_timeout` has passed.
    ///
    /// With a health check, ready means the port accepts connections; the wait
    /// ends early if the process dies while the port is still closed. Without
    /// one, ready means the process exists.
    ///
    /// # Errors
    ///
    /// Returns `HealthCheckFailed` with the last observed status when the
    /// service is not ready in time.
    pub async fn wait_healthy(
        &self,
        spec: &ServiceSpec,
        pid: u32,
        total_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), HealthCheckFailed> {
        let started = Instant::now();
        let failed = |last_status, exited| HealthCheckFailed {
            service: spec.name.clone(),
            pid,
            last_status,
            exited,
            waited: started.elapsed(),
        };

        let Some(check) = &spec.health_check else {
            let alive = wait_for(total_timeout, poll_interval, || async move {
                self.is_process_alive(pid).await.then_some(())
            })
            .await;
            return match alive {
                Some(()) => Ok(()),
                None => Err(failed(HealthStatus::Unknown, true)),
            };
        };

        tracing::debug!("Waiting up to {total_timeout:?} for `{}` on {check}", spec.name);
        let outcome = wait_for(total_timeout, poll_interval, || async move {
            if self
                .is_port_open(&check.host, check.port, self.connect_timeout)
                .await
            {
                return Some(true);
            }
            if self.is_process_alive(pid).await {
                None
            } else {
                Some(false)
            }
        })
        .await;

        match outcome {
            Some(true) => {
                tracing::debug!("`{}` is reachable after {:?}", spec.name, started.elapsed());
                Ok(())
            }
            Some(false) => Err(failed(HealthStatus::Unreachable, true)),
            None => Err(failed(HealthStatus::Unreachable, false)),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{collections::HashMap, sync::Mutex};

    use super::*;

    /// Ports open at fixed offsets from creation, measured on the tokio
    /// clock; ports without an entry never open.
    #[derive(Debug)]
    pub struct ScriptedPorts {
        created: Instant,
        open_after: Mutex<HashMap<u16, Duration>>,
        probes: Mutex<Vec<(u16, Duration)>>,
    }

    impl ScriptedPorts {
        pub fn new() -> Self {
            Self {
                created: Instant::now(),
                open_after: Mutex::new(HashMap::new()),
                probes: Mutex::new(Vec::new()),
            }
        }

        pub fn open_after(&self, port: u16, after: Duration) {
            self.open_after.lock().unwrap().insert(port, after);
        }

        /// (port, time since creation) for every probe made.
        pub fn probes(&self) -> Vec<(u16, Duration)> {
            self.probes.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PortProbe for ScriptedPorts {
        async fn is_port_open(&self, _host: &str, port: u16, _timeout: Duration) -> bool {
            let now = self.created.elapsed();
            self.probes.lock().unwrap().push((port, now));
            self.open_after
                .lock()
                .unwrap()
                .get(&port)
                .is_some_and(|after| now >= *after)
        }
    }
}
