//! Per-record exclusive locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per record ID, held across load-mutate-save.
#[derive(Clone, Default)]
pub struct RecordLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `vnfr_id`.
    pub async fn acquire(&self, vnfr_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(vnfr_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry of a terminated record.
    ///
    /// An entry still held or awaited elsewhere is kept, so two callers
    /// never end up with different mutexes for the same record.
    pub async fn forget(&self, vnfr_id: &str) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(vnfr_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(vnfr_id);
        }
    }

    /// Number of records with a lock entry.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
