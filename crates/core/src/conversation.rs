//! Conversation State Machine
//!
//! Owns the ordered turn history of one chat session and the single request
//! allowed to be in flight. A submission appends the user's turn, dispatches
//! one completion, and appends exactly one assistant turn when the latest
//! request settles. Completions for superseded requests are dropped.
//!
//! Dispatch and settlement are split (`begin_submit` / `finish_submit`) so a
//! caller can await the network without holding the session; `submit` drives
//! both halves for callers that can.

use crate::{
    completion::{Completion, CompletionClient, CompletionError, CompletionRequest},
    normalize::{TextDirection, classify_direction},
    prompts::Prompts,
    request::{Abandon, InFlight, RequestTicket, RequestTracker, Settled},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Seed turn shown at the top of every fresh conversation.
pub const GREETING: &str =
    "مرحبًا، أنا إما مساعدتك في تعلم اللغة الإنجليزية. كيف يمكنني مساعدتك اليوم؟";

/// Assistant turn appended when a completion fails.
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One message in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    sender: Sender,
    text: String,
    timestamp: DateTime<Utc>,
}

impl Turn {
    fn now(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn direction(&self) -> TextDirection {
        classify_direction(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Idle,
    Pending,
}

/// A dispatched chat request, waiting to be sent.
#[derive(Debug)]
pub struct PendingTurn {
    pub ticket: RequestTicket,
    pub request: CompletionRequest,
    pub cancel: CancellationToken,
}

/// State of one chat session.
pub struct ConversationSession {
    history: Vec<Turn>,
    draft: String,
    tracker: RequestTracker,
    prompts: Arc<Prompts>,
}

impl ConversationSession {
    /// Creates a session whose history holds only the greeting.
    pub fn new(prompts: Arc<Prompts>) -> Self {
        Self {
            history: vec![Turn::now(Sender::Assistant, GREETING)],
            draft: String::new(),
            tracker: RequestTracker::new(),
            prompts,
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn state(&self) -> RequestState {
        if self.tracker.in_flight().is_some() {
            RequestState::Pending
        } else {
            RequestState::Idle
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Appends the user's turn and dispatches a request for it.
    ///
    /// Returns `None` without touching the history when `text` is blank.
    /// A request already in flight is superseded and cancelled.
    pub fn begin_submit(&mut self, text: &str) -> Option<PendingTurn> {
        let request = match self.prompts.chat_request(text) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Dropping blank submission");
                return None;
            }
        };
        if let Some(superseded) = self.tracker.in_flight() {
            warn!(%superseded, "Submitting while a request is in flight; the earlier reply will be discarded");
        }
        self.history.push(Turn::now(Sender::User, text));
        let (ticket, cancel) = self.tracker.issue();
        debug!(%ticket, "Chat request dispatched");
        Some(PendingTurn {
            ticket,
            request,
            cancel,
        })
    }

    /// Applies the outcome of `ticket` if it is still the latest request.
    pub fn finish_submit(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<Completion, CompletionError>,
    ) -> Settled {
        if !self.tracker.settle(ticket) {
            debug!(%ticket, "Discarding stale chat reply");
            return Settled::Discarded;
        }
        let reply = match outcome {
            Ok(completion) => completion.into_text_or_fallback(),
            Err(CompletionError::Cancelled) => {
                debug!(%ticket, "Chat request cancelled");
                return Settled::Discarded;
            }
            Err(e) => {
                warn!(%ticket, error = %e, "Chat request failed");
                APOLOGY.to_string()
            }
        };
        self.history.push(Turn::now(Sender::Assistant, reply));
        Settled::Applied
    }

    /// Submits `text` and waits for the reply.
    ///
    /// Returns `None` when the submission was blank.
    #[instrument(name = "chat_submit", skip_all, fields(turns = self.history.len()))]
    pub async fn submit(&mut self, client: &dyn CompletionClient, text: &str) -> Option<Settled> {
        let PendingTurn {
            ticket,
            request,
            cancel,
        } = self.begin_submit(text)?;
        let guard = InFlight::new(self, ticket);
        let outcome = client.complete(request, cancel).await;
        Some(guard.finish(|session, ticket| session.finish_submit(ticket, outcome)))
    }

    /// Submits the current draft, clearing it first.
    pub async fn submit_draft(&mut self, client: &dyn CompletionClient) -> Option<Settled> {
        let text = std::mem::take(&mut self.draft);
        self.submit(client, &text).await
    }

    /// Starts over from the greeting, cancelling any request in flight.
    pub fn reset(&mut self) {
        if let Some(ticket) = self.tracker.invalidate() {
            info!(%ticket, "Reset cancelled an in-flight chat request");
        }
        self.history = vec![Turn::now(Sender::Assistant, GREETING)];
        self.draft.clear();
    }

    /// Cancels any request in flight. Used when the session goes away.
    pub fn close(&mut self) {
        if let Some(ticket) = self.tracker.invalidate() {
            info!(%ticket, "Closed chat session with a request in flight");
        }
    }
}

impl Abandon for ConversationSession {
    fn abandon(&mut self, ticket: RequestTicket) {
        if self.tracker.is_current(ticket) {
            warn!(%ticket, "Chat request abandoned before it settled");
            self.tracker.invalidate();
        }
    }
}
