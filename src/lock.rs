//! Per-(account, folder) mutual exclusion for sync passes.
//!
//! Each key maps to its own fair async mutex, so waiters for the same folder
//! queue in arrival order while different folders never contend. The guard
//! releases on drop, which covers every exit path of the protected section,
//! panics included.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Default)]
pub struct SyncLockRegistry {
    // Entries are created on demand and retained; the map stays bounded by
    // the number of distinct (account, folder) keys seen.
    locks: StdMutex<HashMap<(i64, String), Arc<Mutex<()>>>>,
}

/// Held for the duration of one sync pass; dropping it releases the lock.
pub struct SyncGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SyncLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, account_id: i64, folder_name: &str) -> SyncGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry((account_id, folder_name.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        debug!(account = account_id, folder = %folder_name, "Sync lock acquired");
        SyncGuard { _guard: guard }
    }
}
