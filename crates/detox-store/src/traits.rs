//! Store trait definitions

use std::sync::Mutex;

use crate::{AuditEvent, RegistrySnapshot, StoreResult};

/// Load/save of the block registry
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot; `None` when nothing was saved yet
    fn load(&self) -> StoreResult<Option<RegistrySnapshot>>;

    /// Replace the saved snapshot
    fn save(&self, snapshot: &RegistrySnapshot) -> StoreResult<()>;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Append-only record of what happened to blocks
pub trait AuditLog: Send + Sync {
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Most recent events first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    fn is_healthy(&self) -> bool;
}

/// Snapshot store kept in memory (for testing)
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    saved: Mutex<Option<RegistrySnapshot>>,
    saves: Mutex<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn saved(&self) -> Option<RegistrySnapshot> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> StoreResult<Option<RegistrySnapshot>> {
        Ok(self.saved())
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> StoreResult<()> {
        *self.saved.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
