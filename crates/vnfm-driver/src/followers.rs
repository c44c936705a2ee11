//! Log followers: detached tasks that relay container output.
//!
//! One task per container waits for the configured delay, opens the log
//! stream and emits every line as a `debug!` event until the stream ends.
//! Failures are absorbed. The task is cancelled when its container is
//! stopped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;
use vnfm_engine::Engine;

/// Per-container follower state.
struct FollowerSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Tracks the log follower of every running container.
#[derive(Clone)]
pub struct LogFollowers {
    delay: Duration,
    /// Active followers: container_id → slot.
    slots: Arc<RwLock<HashMap<String, FollowerSlot>>>,
}

impl LogFollowers {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start following `container_id`, replacing any previous follower.
    pub async fn follow(&self, engine: Arc<dyn Engine>, container_id: &str, record_name: &str) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let delay = self.delay;
        let container = container_id.to_string();
        let record = record_name.to_string();

        let handle = tokio::spawn(async move {
            relay_logs(engine, &container, &record, delay, shutdown_rx).await;
        });

        let mut slots = self.slots.write().await;
        if let Some(old) = slots.insert(
            container_id.to_string(),
            FollowerSlot {
                handle,
                shutdown_tx,
            },
        ) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }
        debug!(%container_id, record = %record_name, "log follower started");
    }

    /// Stop following `container_id`. No-op if it is not followed.
    pub async fn cancel(&self, container_id: &str) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.remove(container_id) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(%container_id, "log follower stopped");
        }
    }

    /// Stop every follower (for graceful shutdown).
    pub async fn cancel_all(&self) {
        let mut slots = self.slots.write().await;
        for (container_id, slot) in slots.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(%container_id, "log follower stopped");
        }
    }

    pub async fn is_following(&self, container_id: &str) -> bool {
        self.slots.read().await.contains_key(container_id)
    }

    pub async fn active(&self) -> Vec<String> {
        self.slots.read().await.keys().cloned().collect()
    }
}

async fn relay_logs(
    engine: Arc<dyn Engine>,
    container_id: &str,
    record: &str,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = shutdown.changed() => return,
    }

    let mut lines = match engine.container_logs(container_id).await {
        Ok(lines) => lines,
        Err(e) => {
            debug!(%container_id, %record, error = %e, "container logs unavailable");
            return;
        }
    };

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => debug!(%record, %container_id, %line, "container log"),
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!(%container_id, %record, "log stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use vnfm_engine::mock::{EngineCall, MockEngine};
    use vnfm_engine::ContainerConfig;

    #[tokio::test]
    async fn follower_reads_logs_and_can_be_cancelled() {
        let engine = Arc::new(MockEngine::new().with_logs(&["ready"]));
        let created = engine
            .create_container("web-1000", &ContainerConfig::default())
            .await
            .unwrap();

        let followers = LogFollowers::new(Duration::ZERO);
        followers.follow(engine.clone(), &created.id, "web").await;
        assert!(followers.is_following(&created.id).await);

        for _ in 0..50 {
            if engine.count(|c| matches!(c, EngineCall::ContainerLogs(_))) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(engine.count(|c| matches!(c, EngineCall::ContainerLogs(_))), 1);

        followers.cancel(&created.id).await;
        assert!(!followers.is_following(&created.id).await);
    }

    #[tokio::test]
    async fn cancelled_before_delay_never_reads() {
        let engine = Arc::new(MockEngine::new());
        let followers = LogFollowers::new(Duration::from_secs(3600));
        followers.follow(engine.clone(), "c1", "web").await;
        followers.cancel_all().await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(followers.active().await.is_empty());
        assert_eq!(engine.count(|c| matches!(c, EngineCall::ContainerLogs(_))), 0);
    }

    #[tokio::test]
    async fn missing_container_is_absorbed() {
        let engine = Arc::new(MockEngine::new());
        let followers = LogFollowers::new(Duration::ZERO);
        followers.follow(engine.clone(), "ghost", "web").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        followers.cancel("ghost").await;
    }
}
