//! Durable mapping from service name to the pid that serves it.
//!
//! A marker only says which pid was launched for a service. The pid may have
//! died (or been reused) since, so every consumer re-validates it against the
//! OS, and [`Registry::is_alive`] drops markers whose process is gone.

mod file;
mod memory;

use warden_types::ProcessRecord;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;

use crate::{error::Result, platform::ProcessControl};

#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Write or overwrite the marker for `record.service`.
    async fn put(&self, record: &ProcessRecord) -> Result<()>;
    /// Read the marker for `name`, if any.
    async fn get(&self, name: &str) -> Result<Option<ProcessRecord>>;
    /// Delete the marker for `name`. Deleting a missing marker succeeds.
    async fn remove(&self, name: &str) -> Result<()>;
    /// Every marker currently present, ordered by service name.
    async fn list(&self) -> Result<Vec<ProcessRecord>>;

    /// Whether `name` is tracked and its process still exists.
    ///
    /// A marker whose process is gone is removed before returning `false`,
    /// so callers never see a "tracked but dead" service.
    async fn is_alive(&self, name: &str, control: &dyn ProcessControl) -> Result<bool> {
        let Some(record) = self.get(name).await? else {
            return Ok(false);
        };
        if control.is_alive(record.pid).await {
            return Ok(true);
        }

        tracing::info!(
            "Removing stale marker for `{name}`: pid {} is not running",
            record.pid
        );
        self.remove(name).await?;
        Ok(false)
    }
}
