//! Cluster event bus: kill/close notifications fanned out to every node.
//!
//! There is no cross-node ordering, so handlers must be idempotent: a kill
//! for an absent session or a repeated close is a no-op.
//!
//! Delivery is bounded by the bus capacity (`RUNMESH_EVENT_BUS_CAPACITY`). A
//! subscriber that falls more than `capacity` events behind loses the oldest
//! ones; a lost close leaves that session registered on the node until the
//! node shuts down or a later close for the run arrives.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use runmesh_core::event::{SessionEvent, SessionEventKind};
use runmesh_core::id::RunId;

use crate::error::Result;
use crate::session::SessionRegistry;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Broadcast to every subscriber, including the publisher's own node.
    async fn publish(&self, event: SessionEvent) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// In-process bus on a tokio broadcast channel. Nodes sharing one instance
/// see each other's events. Each subscriber buffers at most `capacity`
/// undelivered events.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: SessionEvent) -> Result<()> {
        // no subscribers is not an error: nobody holds a session to act on
        match self.tx.send(event) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

/// Session-facing publisher handed to every session's collaborators.
#[derive(Clone)]
pub struct EventManager {
    bus: Arc<dyn EventBus>,
}

impl EventManager {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub async fn publish(&self, event: SessionEvent) -> Result<()> {
        self.bus.publish(event).await
    }

    /// Fire-and-forget stop request for `action_name` in `run_id`.
    pub async fn kill_action(&self, run_id: &RunId, action_name: &str) -> Result<()> {
        self.publish(SessionEvent::kill_action(run_id.clone(), action_name))
            .await
    }

    pub async fn close_session(&self, run_id: &RunId) -> Result<()> {
        self.publish(SessionEvent::close(run_id.clone())).await
    }
}

/// Apply one event to this node's registry.
pub fn handle_event(registry: &SessionRegistry, event: &SessionEvent) {
    match event.kind {
        SessionEventKind::KillAction => match event.action_name() {
            Some(name) => {
                registry.kill_current_action(&event.run_id, name);
            }
            None => warn!(run_id = %event.run_id, "kill event without an action name"),
        },
        SessionEventKind::Close => {
            registry.close(&event.run_id);
        }
    }
}

/// Run the node-local handler until `shutdown` fires or the bus goes away.
/// Events skipped after a lag are logged with their count and not replayed.
pub fn spawn_session_listener(
    bus: Arc<dyn EventBus>,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        debug!(run_id = %event.run_id, kind = ?event.kind, "session event");
                        handle_event(&registry, &event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        error!(
                            skipped,
                            "session listener lagged; kill/close events lost, raise RUNMESH_EVENT_BUS_CAPACITY"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("session listener stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_subscribers() {
        let bus = BroadcastEventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(SessionEvent::kill_action(RunId::new("r1"), "crawl"))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, SessionEventKind::KillAction);
        assert_eq!(event.action_name(), Some("crawl"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = BroadcastEventBus::new(0);
        assert_eq!(bus.capacity(), 1);
        let manager = EventManager::new(Arc::new(bus));
        manager.close_session(&RunId::new("r1")).await.unwrap();
    }

    #[tokio::test]
    async fn slow_subscriber_keeps_only_the_newest_events() {
        let bus = BroadcastEventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(SessionEvent::close(RunId::new(format!("r{i}"))))
                .await
                .unwrap();
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.unwrap().run_id, RunId::new("r3"));
        assert_eq!(rx.recv().await.unwrap().run_id, RunId::new("r4"));
    }
}
