//! Idle Session Sweeper
//!
//! A client that goes away without deleting its session leaves it behind.
//! The sweeper periodically closes and removes sessions nobody has touched
//! for the configured idle time.

use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::state::AppState;

/// Spawns the sweeper. It runs until `shutdown` is cancelled.
pub fn spawn_session_sweeper(
    state: Arc<AppState>,
    idle: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    // Several checks per idle period, never faster than every 10ms.
    let tick = (idle / 4).max(Duration::from_millis(10));
    tokio::spawn(async move {
        info!(
            idle_secs = idle.as_secs(),
            "Starting idle session sweeper"
        );
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Idle session sweeper stopped");
                    break;
                }
                _ = interval.tick() => {
                    let swept = state.sweep_idle(idle).await;
                    if swept.chats + swept.lessons > 0 {
                        debug!(chats = swept.chats, lessons = swept.lessons, "Swept idle sessions");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LessonEntry;
    use aima_core::{Completion, CompletionClient, CompletionError, CompletionRequest, Prompts};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct Unused;

    #[async_trait]
    impl CompletionClient for Unused {
        async fn complete(
            &self,
            _request: CompletionRequest,
            _cancel: CancellationToken,
        ) -> Result<Completion, CompletionError> {
            Ok(Completion::Empty)
        }
    }

    #[tokio::test]
    async fn test_sweeper_expires_idle_sessions_until_shutdown() {
        let state = Arc::new(AppState::new(
            Arc::new(Unused),
            Arc::new(Prompts::default()),
        ));
        let id = Uuid::new_v4();
        state
            .insert_lesson(id, LessonEntry::new(state.prompts.clone()))
            .await;

        let shutdown = CancellationToken::new();
        let sweeper =
            spawn_session_sweeper(state.clone(), Duration::from_millis(50), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(state.lesson(id).await.is_none());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper should stop on shutdown")
            .unwrap();
    }
}
