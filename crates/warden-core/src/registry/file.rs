use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use warden_types::{is_valid_service_name, ProcessRecord};

use super::Registry;
use crate::error::{RegistryError, Result};

const MARKER_EXTENSION: &str = "pid";

/// On-disk form of a [`ProcessRecord`].
#[derive(Debug, Serialize, Deserialize)]
struct Marker {
    service: String,
    pid: u32,
    /// Seconds since the unix epoch.
    started_at: u64,
}

impl From<&ProcessRecord> for Marker {
    fn from(record: &ProcessRecord) -> Self {
        Self {
            service: record.service.clone(),
            pid: record.pid,
            started_at: record
                .started_at
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
        }
    }
}

/// One `<service>.pid` file per tracked service in a directory.
///
/// Markers are JSON. A file holding nothing but a decimal pid, as written by
/// `echo $! > math.pid`, is read too.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    dir: PathBuf,
}

impl FileRegistry {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self, name: &str) -> Result<PathBuf> {
        if !is_valid_service_name(name) {
            return Err(RegistryError::InvalidName(name.to_owned()));
        }
        Ok(self.dir.join(format!("{name}.{MARKER_EXTENSION}")))
    }

    fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RegistryError + '_ {
        move |source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    async fn parse(name: &str, path: &Path, text: &str) -> Result<ProcessRecord> {
        let text = text.trim();

        if let Ok(pid) = text.parse::<u32>() {
            if pid == 0 {
                return Err(RegistryError::Corrupt {
                    path: path.to_path_buf(),
                    reason: "pid 0".into(),
                });
            }
            let started_at = tokio::fs::metadata(path)
                .await
                .and_then(|m| m.modified())
                .unwrap_or(UNIX_EPOCH);
            return Ok(ProcessRecord {
                service: name.to_owned(),
                pid,
                started_at,
            });
        }

        let marker: Marker = serde_json::from_str(text).map_err(|err| RegistryError::Corrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        if marker.pid == 0 {
            return Err(RegistryError::Corrupt {
                path: path.to_path_buf(),
                reason: "pid 0".into(),
            });
        }
        if marker.service != name {
            tracing::warn!(
                "Marker {} names service `{}`; using the file name",
                path.display(),
                marker.service
            );
        }

        Ok(ProcessRecord {
            service: name.to_owned(),
            pid: marker.pid,
            started_at: UNIX_EPOCH + Duration::from_secs(marker.started_at),
        })
    }
}

#[async_trait::async_trait]
impl Registry for FileRegistry {
    async fn put(&self, record: &ProcessRecord) -> Result<()> {
        let path = self.marker_path(&record.service)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(Self::io_error(&self.dir))?;

        let body = serde_json::to_vec(&Marker::from(record)).map_err(|err| {
            RegistryError::Io {
                path: path.clone(),
                source: err.into(),
            }
        })?;

        // Write-then-rename: a crash mid-write leaves at most a stray temp
        // file, never a truncated marker.
        let tmp = self.dir.join(format!(".{}.{MARKER_EXTENSION}.tmp", record.service));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(Self::io_error(&tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(Self::io_error(&path))?;

        tracing::debug!("Recorded `{}` as pid {}", record.service, record.pid);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ProcessRecord>> {
        let path = self.marker_path(name)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Self::io_error(&path)(err)),
        };

        Self::parse(name, &path, &text).await.map(Some)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.marker_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Removed marker for `{name}`");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Self::io_error(&path)(err)),
        }
    }

    async fn list(&self) -> Result<Vec<ProcessRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Self::io_error(&self.dir)(err)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(Self::io_error(&self.dir))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MARKER_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_valid_service_name(name) {
                names.push(name.to_owned());
            }
        }
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            match self.get(&name).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => tracing::warn!("Skipping unreadable marker: {err}"),
            }
        }

        Ok(records)
    }
}
