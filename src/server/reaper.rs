use std::sync::Arc;
use std::time::Duration;

use super::registry::ObjectRegistry;

/// Session reaper - background task that evicts root sessions idle for
/// longer than the timeout they connected with
pub struct SessionReaper {
    registry: Arc<ObjectRegistry>,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(registry: Arc<ObjectRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run the sweep loop until the task is aborted
    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting session reaper (interval: {:?})", self.interval);
        loop {
            tokio::time::sleep(self.interval).await;
            self.sweep().await;
        }
    }

    /// One pass over the root sessions. Sessions busy with a call are left
    /// for a later pass. Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let mut evicted = 0;
        for root in self.registry.roots() {
            if !self.registry.is_idle(&root) {
                continue;
            }
            let idle_for = root.idle_for();
            if self.registry.evict_if_idle(&root).await {
                tracing::info!(
                    "Evicted idle session {} (idle {:?}, timeout {:?})",
                    root.key,
                    idle_for,
                    root.idle_timeout().unwrap_or_default()
                );
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::debug!(
                "Reaper sweep complete: {} sessions evicted, {} objects live",
                evicted,
                self.registry.len()
            );
        }
        evicted
    }
}
