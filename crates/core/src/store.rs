//! Persistence collaborators consumed by the sync engine.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::model::Snapshot;

pub trait SnapshotStore {
    fn load_snapshot(&self) -> Result<Option<Snapshot>>;
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
}

pub trait SettingsStore {
    fn load_setting(&self, key: &str) -> Result<Option<String>>;
    fn save_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Everything the engine needs to survive a restart.
pub trait Persistence: SnapshotStore + SettingsStore + Send {}

impl<T: SnapshotStore + SettingsStore + Send> Persistence for T {}

/// Process-local store; clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    snapshot: Option<Snapshot>,
    settings: HashMap<String, String>,
    snapshot_saves: usize,
}

impl MemoryStore {
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::default();
        store.inner.lock().snapshot = Some(snapshot);
        store
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.inner.lock().snapshot.clone()
    }

    pub fn snapshot_saves(&self) -> usize {
        self.inner.lock().snapshot_saves
    }
}

impl SnapshotStore for MemoryStore {
    fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        Ok(self.inner.lock().snapshot.clone())
    }

    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.snapshot = Some(snapshot.clone());
        inner.snapshot_saves += 1;
        Ok(())
    }
}

impl SettingsStore for MemoryStore {
    fn load_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().settings.get(key).cloned())
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
