/// Registry of live result-delivery channels
///
/// Routes streamed run events to the caller that started the run. One entry per user:
/// registering a new run for a user replaces (and cancels) the previous one. Entries
/// are removed explicitly when a run ends or as soon as delivery finds the channel closed.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::events::RunEvent;

#[derive(Debug, Clone)]
struct Connection {
    run_id: Uuid,
    sender: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
}

/// Handle returned by `register`; identifies one run's slot
#[derive(Debug, Clone)]
pub struct Registration {
    pub run_id: Uuid,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<String, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a channel for `user_id`, cancelling any run it replaces
    pub async fn register(&self, user_id: &str, sender: mpsc::Sender<RunEvent>) -> Registration {
        let registration = Registration {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        };
        let connection = Connection {
            run_id: registration.run_id,
            sender,
            cancel: registration.cancel.clone(),
        };

        let previous = self.inner.write().await.insert(user_id.to_string(), connection);
        if let Some(previous) = previous {
            tracing::info!(user_id, run_id = %previous.run_id, "🔁 Replacing active connection, cancelling previous run");
            previous.cancel.cancel();
        }

        tracing::debug!(user_id, run_id = %registration.run_id, "🔌 Connection registered");
        registration
    }

    /// Send an event to the user's channel if it still belongs to `run_id`
    ///
    /// Returns `false` when there is no channel, it was replaced by another run, or it
    /// has closed; a closed channel is removed and its run cancelled.
    pub async fn deliver(&self, user_id: &str, run_id: Uuid, event: RunEvent) -> bool {
        let connection = match self.inner.read().await.get(user_id) {
            Some(connection) if connection.run_id == run_id => connection.clone(),
            Some(_) => {
                tracing::debug!(user_id, %run_id, "🚫 Dropping event for a replaced run");
                return false;
            }
            None => return false,
        };

        if connection.sender.send(event).await.is_ok() {
            return true;
        }

        tracing::debug!(user_id, %run_id, "📭 Delivery channel closed, dropping connection");
        connection.cancel.cancel();
        self.remove(user_id, run_id).await;
        false
    }

    /// Remove the user's entry if it still belongs to `run_id`
    pub async fn remove(&self, user_id: &str, run_id: Uuid) -> bool {
        let mut connections = self.inner.write().await;
        match connections.get(user_id) {
            Some(connection) if connection.run_id == run_id => {
                connections.remove(user_id);
                tracing::debug!(user_id, %run_id, "🔌 Connection removed");
                true
            }
            _ => false,
        }
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.inner.read().await.contains_key(user_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_registered_user() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        let reg = registry.register("u1", tx).await;

        assert!(registry.deliver("u1", reg.run_id, RunEvent::Completed).await);
        assert_eq!(rx.recv().await, Some(RunEvent::Completed));
        assert!(!registry.deliver("nobody", reg.run_id, RunEvent::Completed).await);

        assert!(registry.remove("u1", reg.run_id).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn closed_channel_is_dropped_and_cancelled() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::channel(4);
        let reg = registry.register("u1", tx).await;
        drop(rx);

        assert!(!registry.deliver("u1", reg.run_id, RunEvent::Completed).await);
        assert!(!registry.contains("u1").await);
        assert!(reg.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn replacement_cancels_old_run_and_ignores_stale_remove() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        let first = registry.register("u1", tx1).await;
        let second = registry.register("u1", tx2).await;

        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());
        assert!(!registry.remove("u1", first.run_id).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.remove("u1", second.run_id).await);
    }

    #[tokio::test]
    async fn events_from_a_replaced_run_never_reach_the_new_channel() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(1);
        let (tx2, mut rx2) = mpsc::channel(1);

        let first = registry.register("u1", tx1).await;
        let second = registry.register("u1", tx2).await;

        assert!(!registry.deliver("u1", first.run_id, RunEvent::Completed).await);
        assert!(rx2.try_recv().is_err());
        assert!(rx1.try_recv().is_err());
        assert!(registry.contains("u1").await);

        assert!(registry.deliver("u1", second.run_id, RunEvent::Completed).await);
        assert_eq!(rx2.recv().await, Some(RunEvent::Completed));
    }

    #[tokio::test]
    async fn concurrent_users_do_not_interfere() {
        let registry = ConnectionRegistry::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (tx, mut rx) = mpsc::channel(1);
                let user = format!("user-{i}");
                let reg = registry.register(&user, tx).await;
                assert!(registry.deliver(&user, reg.run_id, RunEvent::Completed).await);
                assert_eq!(rx.recv().await, Some(RunEvent::Completed));
                registry.remove(&user, reg.run_id).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert!(registry.is_empty().await);
    }
}
