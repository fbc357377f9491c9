use std::{collections::BTreeMap, sync::Mutex};

use warden_types::ProcessRecord;

use super::Registry;
use crate::error::Result;

/// Registry kept in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Mutex<BTreeMap<String, ProcessRecord>>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ProcessRecord>> {
        // A panic while holding the lock cannot leave a map half-updated.
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Registry for MemoryRegistry {
    async fn put(&self, record: &ProcessRecord) -> Result<()> {
        self.records().insert(record.service.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ProcessRecord>> {
        Ok(self.records().get(name).cloned())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.records().remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ProcessRecord>> {
        Ok(self.records().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove() {
        let registry = MemoryRegistry::new();
        registry.put(&ProcessRecord::new("math", 10)).await.unwrap();
        registry.put(&ProcessRecord::new("math", 11)).await.unwrap();

        assert_eq!(registry.get("math").await.unwrap().map(|r| r.pid), Some(11));

        registry.remove("math").await.unwrap();
        registry.remove("math").await.unwrap();
        assert!(registry.list().await.unwrap().is_empty());
    }
}
