//! Per-group serialization.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per group, created on first use.
///
/// Writes to the same group queue behind each other; different groups never block one
/// another. Entries nobody holds or waits on are dropped on the next acquire, so the
/// table stays bounded by the number of groups in use at once.
#[derive(Debug, Default)]
pub struct GroupLocks {
    groups: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to a group. Released when the guard drops.
    pub async fn acquire(&self, group_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut groups = self.groups.lock().await;
            // Guards and waiters hold clones; a count of one means the entry is idle.
            groups.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(groups.entry(group_id).or_default())
        };
        lock.lock_owned().await
    }
}
