//! Shared countdown timer. The timer state that travels with the room is
//! plain data; the ticking happens in a per-room background task that
//! reloads, decrements, and saves under the room lock like any command.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Room, Timer};
use crate::permissions::RoomAction;

use super::{EngineEvent, RoomEngine};

impl RoomEngine {
    /// Start (or restart) the countdown. Replaces any running timer.
    pub async fn start_timer(
        self: Arc<Self>,
        room_id: Uuid,
        actor_id: Uuid,
        duration_secs: u32,
    ) -> Result<Room> {
        if duration_secs == 0 {
            return Err(Error::Conflict("timer duration must be positive".into()));
        }
        let room = {
            let lock = self.sessions().room_lock(room_id).await;
            let _guard = lock.lock().await;
            let mut room = self.load_required(room_id).await?;
            Self::require_active(&room)?;
            Self::authorize(&room, actor_id, RoomAction::ManageTimer)?;
            room.timer = Some(Timer::start(duration_secs));
            self.sessions().save(&room).await?;
            room
        };
        let engine = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            engine.run_timer(room_id).await;
        });
        self.timers().register(room_id, handle).await;
        info!(room_id = %room_id, duration_secs, "Timer started");
        Ok(room)
    }

    /// Halt the countdown and clear the remaining time
    pub async fn stop_timer(&self, room_id: Uuid, actor_id: Uuid) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::ManageTimer)?;
        self.timers().abort(room_id).await;
        if let Some(timer) = &mut room.timer {
            timer.is_running = false;
            timer.remaining = 0;
        }
        self.sessions().save(&room).await?;
        info!(room_id = %room_id, "Timer stopped");
        Ok(room)
    }

    /// One-second tick loop. Each tick is a full load-modify-save under the
    /// room lock so ticks interleave cleanly with inbound commands. The loop
    /// stops itself when the room, the timer, or the countdown is gone.
    async fn run_timer(self: Arc<Self>, room_id: Uuid) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let lock = self.sessions().room_lock(room_id).await;
            let _guard = lock.lock().await;
            let room = match self.sessions().load(room_id).await {
                Ok(Some(mut room)) => {
                    let Some(timer) = &mut room.timer else {
                        break;
                    };
                    if !timer.is_running || timer.remaining == 0 {
                        break;
                    }
                    timer.remaining -= 1;
                    if timer.remaining == 0 {
                        timer.is_running = false;
                    }
                    if self.sessions().save(&room).await.is_err() {
                        break;
                    }
                    room
                }
                _ => break,
            };
            let finished = room.timer.as_ref().is_some_and(|t| !t.is_running);
            self.emit(EngineEvent::RoomUpdated(room));
            if finished {
                debug!(room_id = %room_id, "Timer ran out");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{add_participant, engine_with_room};
    use super::*;

    #[tokio::test]
    async fn start_and_stop_round_trip() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let updated = engine
            .clone()
            .start_timer(room.id, facilitator_id, 300)
            .await
            .unwrap();
        let timer = updated.timer.as_ref().unwrap();
        assert!(timer.is_running);
        assert_eq!(timer.duration, 300);
        assert_eq!(timer.remaining, 300);
        assert!(timer.started_at.is_some());

        let updated = engine.stop_timer(room.id, facilitator_id).await.unwrap();
        let timer = updated.timer.as_ref().unwrap();
        assert!(!timer.is_running);
        assert_eq!(timer.remaining, 0);
    }

    #[tokio::test]
    async fn timer_is_facilitator_only() {
        let (engine, room, _f, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let err = engine.clone().start_timer(room.id, bob_id, 60).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let err = engine.stop_timer(room.id, bob_id).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let err = engine
            .clone()
            .start_timer(room.id, facilitator_id, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_count_down_and_finish() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        engine.clone().start_timer(room.id, facilitator_id, 2).await.unwrap();

        // Two virtual seconds drain the countdown
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        let loaded = engine.sessions().load(room.id).await.unwrap().unwrap();
        let timer = loaded.timer.as_ref().unwrap();
        assert_eq!(timer.remaining, 0);
        assert!(!timer.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_running_countdown() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        engine.clone().start_timer(room.id, facilitator_id, 100).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let updated = engine
            .clone()
            .start_timer(room.id, facilitator_id, 50)
            .await
            .unwrap();
        assert_eq!(updated.timer.as_ref().unwrap().remaining, 50);
    }
}
