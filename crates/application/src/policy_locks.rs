use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use vmwarden_core::ResourceGroupName;

/// Process-local keyed mutex serializing read-modify-write cycles per policy.
///
/// Keys are case-insensitive on both resource group and policy name. Idle
/// entries are pruned on the next acquisition.
#[derive(Clone, Default)]
pub struct PolicyLocks {
    entries: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl PolicyLocks {
    /// Waits for exclusive access to one policy.
    pub async fn acquire(
        &self,
        resource_group: &ResourceGroupName,
        policy_name: &str,
    ) -> OwnedMutexGuard<()> {
        let key = format!(
            "{}/{}",
            resource_group.as_str().to_ascii_lowercase(),
            policy_name.to_ascii_lowercase()
        );

        let lock = {
            let mut entries = self.entries.lock().await;
            entries.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(entries.entry(key).or_default())
        };

        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}
