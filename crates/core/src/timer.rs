//! Timer tick task registry
//!
//! Tick tasks are runtime-only resources: at most one per room, cancellable,
//! and never part of the persisted aggregate. Starting a timer replaces (and
//! aborts) any task already running for that room.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct TimerRegistry {
    handles: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new tick task, aborting any prior one for the room
    pub async fn register(&self, room_id: Uuid, handle: JoinHandle<()>) {
        if let Some(previous) = self.handles.lock().await.insert(room_id, handle) {
            previous.abort();
            debug!(room_id = %room_id, "Replaced running timer task");
        }
    }

    /// Cancel the room's tick task, if any. Returns whether one existed.
    pub async fn abort(&self, room_id: Uuid) -> bool {
        match self.handles.lock().await.remove(&room_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_register_aborts_previous() {
        let registry = TimerRegistry::new();
        let room = Uuid::new_v4();

        let first = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        registry.register(room, first).await;

        let second = tokio::spawn(async {});
        registry.register(room, second).await;

        // Only the second task remains tracked
        assert!(registry.abort(room).await);
        assert!(!registry.abort(room).await);
    }

    #[tokio::test]
    async fn test_abort_unknown_room() {
        let registry = TimerRegistry::new();
        assert!(!registry.abort(Uuid::new_v4()).await);
    }
}
