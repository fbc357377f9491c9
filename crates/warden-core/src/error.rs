use std::{path::PathBuf, time::Duration};

use thiserror::Error;
use warden_types::HealthStatus;

pub type Result<R, E = RegistryError> = std::result::Result<R, E>;

/// Failure to read or write a pid marker.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid service name `{0}`")]
    InvalidName(String),

    #[error("registry io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupted marker {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// The launcher could not bring a process up.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("service `{service}` has an empty command")]
    EmptyCommand { service: String },

    #[error("cannot open log {} for `{service}`: {source}", path.display())]
    Log {
        service: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot spawn `{program}` for `{service}`: {source}")]
    Spawn {
        service: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process is running but could not be recorded.
    #[error("`{service}` started as pid {pid} but its marker could not be written")]
    Registry {
        service: String,
        pid: u32,
        #[source]
        source: RegistryError,
    },
}

/// A service did not become ready in time.
#[derive(Debug, Error)]
#[error("`{service}` not healthy after {waited:?} (last status: {last_status}, exited: {exited})")]
pub struct HealthCheckFailed {
    pub service: String,
    pub pid: u32,
    pub last_status: HealthStatus,
    /// The process was gone when the wait ended.
    pub exited: bool,
    pub waited: Duration,
}

/// Stopping a service did not go cleanly. The marker is gone afterwards
/// except after [`StopError::Registry`].
#[derive(Debug, Error)]
pub enum StopError {
    #[error("cannot signal `{service}` (pid {pid}): {source}")]
    Signal {
        service: String,
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// The marker could not be read; it was deleted without signalling.
    #[error("dropped unreadable marker of `{service}`: {source}")]
    Corrupt {
        service: String,
        #[source]
        source: RegistryError,
    },

    /// The marker could not be removed and is still on disk.
    #[error("registry error while stopping `{service}`: {source}")]
    Registry {
        service: String,
        #[source]
        source: RegistryError,
    },
}

/// Why a service failed to reach `Running`.
#[derive(Debug, Error)]
pub enum StartFailure {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Health(#[from] HealthCheckFailed),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
