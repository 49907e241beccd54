//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the completion
//! client, the prompt set, and every live chat and lesson session. Each
//! session remembers when it was last touched so idle ones can be swept.

use aima_core::{Alert, CompletionClient, ConversationSession, LessonSession, Prompts};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, RwLock, mpsc},
    time::Instant,
};
use tracing::info;
use uuid::Uuid;

/// A lesson session together with the alerts it has raised but not yet reported.
pub struct LessonEntry {
    pub session: LessonSession,
    pub alerts: mpsc::UnboundedReceiver<Alert>,
}

impl LessonEntry {
    pub fn new(prompts: Arc<Prompts>) -> Self {
        let (tx, alerts) = mpsc::unbounded_channel();
        Self {
            session: LessonSession::new(prompts, Arc::new(tx)),
            alerts,
        }
    }

    /// Takes every alert raised since the last call.
    pub fn drain_alerts(&mut self) -> Vec<Alert> {
        let mut drained = Vec::new();
        while let Ok(alert) = self.alerts.try_recv() {
            drained.push(alert);
        }
        drained
    }
}

pub type ChatHandle = Arc<Mutex<ConversationSession>>;
pub type LessonHandle = Arc<Mutex<LessonEntry>>;

struct Slot<T> {
    handle: Arc<Mutex<T>>,
    last_touched: Instant,
}

impl<T> Slot<T> {
    fn new(value: T) -> Self {
        Self {
            handle: Arc::new(Mutex::new(value)),
            last_touched: Instant::now(),
        }
    }

    fn touch(&mut self) -> Arc<Mutex<T>> {
        self.last_touched = Instant::now();
        self.handle.clone()
    }
}

/// Removes every slot idle for at least `idle` and hands back their sessions.
fn take_idle<T>(slots: &mut HashMap<Uuid, Slot<T>>, idle: Duration) -> Vec<(Uuid, Arc<Mutex<T>>)> {
    let expired: Vec<Uuid> = slots
        .iter()
        .filter(|(_, slot)| slot.last_touched.elapsed() >= idle)
        .map(|(id, _)| *id)
        .collect();
    expired
        .into_iter()
        .filter_map(|id| slots.remove(&id).map(|slot| (id, slot.handle)))
        .collect()
}

/// Counts of sessions removed by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Swept {
    pub chats: usize,
    pub lessons: usize,
}

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub client: Arc<dyn CompletionClient>,
    pub prompts: Arc<Prompts>,
    chats: RwLock<HashMap<Uuid, Slot<ConversationSession>>>,
    lessons: RwLock<HashMap<Uuid, Slot<LessonEntry>>>,
}

impl AppState {
    pub fn new(client: Arc<dyn CompletionClient>, prompts: Arc<Prompts>) -> Self {
        Self {
            client,
            prompts,
            chats: RwLock::new(HashMap::new()),
            lessons: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert_chat(&self, id: Uuid, session: ConversationSession) {
        self.chats.write().await.insert(id, Slot::new(session));
    }

    /// Looks up a chat session and marks it as used.
    pub async fn chat(&self, id: Uuid) -> Option<ChatHandle> {
        self.chats.write().await.get_mut(&id).map(Slot::touch)
    }

    pub async fn remove_chat(&self, id: Uuid) -> Option<ChatHandle> {
        self.chats.write().await.remove(&id).map(|slot| slot.handle)
    }

    pub async fn insert_lesson(&self, id: Uuid, entry: LessonEntry) {
        self.lessons.write().await.insert(id, Slot::new(entry));
    }

    /// Looks up a lesson session and marks it as used.
    pub async fn lesson(&self, id: Uuid) -> Option<LessonHandle> {
        self.lessons.write().await.get_mut(&id).map(Slot::touch)
    }

    pub async fn remove_lesson(&self, id: Uuid) -> Option<LessonHandle> {
        self.lessons.write().await.remove(&id).map(|slot| slot.handle)
    }

    /// Removes sessions untouched for at least `idle` and closes them, which
    /// cancels whatever request they still had in flight.
    pub async fn sweep_idle(&self, idle: Duration) -> Swept {
        let chats = take_idle(&mut *self.chats.write().await, idle);
        let lessons = take_idle(&mut *self.lessons.write().await, idle);

        for (id, handle) in &chats {
            handle.lock().await.close();
            info!(session_id = %id, "Idle chat session expired");
        }
        for (id, handle) in &lessons {
            handle.lock().await.session.close();
            info!(session_id = %id, "Idle lesson session expired");
        }

        Swept {
            chats: chats.len(),
            lessons: lessons.len(),
        }
    }
}
