//! API Models
//!
//! Request payloads and response views exchanged with the rendering surface.
//! Views are projections of the engine's session state; they carry the
//! writing direction of every text unit so the client can lay it out.

use aima_core::{
    Alert, ConversationSession, LessonSession, LessonStatus, RequestState, Sender, TextDirection,
    Turn, normalize::DisplayLine,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ltr,
    Rtl,
}

impl From<TextDirection> for Direction {
    fn from(direction: TextDirection) -> Self {
        match direction {
            TextDirection::Ltr => Direction::Ltr,
            TextDirection::Rtl => Direction::Rtl,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnSender {
    User,
    Assistant,
}

impl From<Sender> for TurnSender {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => TurnSender::User,
            Sender::Assistant => TurnSender::Assistant,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct TurnView {
    #[schema(example = "user")]
    pub sender: TurnSender,
    #[schema(example = "I goes to school every day.")]
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        Self {
            sender: turn.sender().into(),
            text: turn.text().to_string(),
            timestamp: turn.timestamp(),
            direction: turn.direction().into(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ChatSessionView {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    /// True while a reply is awaited.
    pub pending: bool,
    pub history: Vec<TurnView>,
}

impl ChatSessionView {
    pub fn new(session_id: Uuid, session: &ConversationSession) -> Self {
        Self {
            session_id,
            pending: session.state() == RequestState::Pending,
            history: session.history().iter().map(TurnView::from).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct LineView {
    pub text: String,
    pub direction: Direction,
}

impl From<DisplayLine> for LineView {
    fn from(line: DisplayLine) -> Self {
        Self {
            text: line.text,
            direction: line.direction.into(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct AlertView {
    #[schema(example = "Error")]
    pub title: String,
    #[schema(example = "Could not load the lesson. Try again later.")]
    pub message: String,
}

impl From<Alert> for AlertView {
    fn from(alert: Alert) -> Self {
        Self {
            title: alert.title,
            message: alert.message,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LessonState {
    NoCategory,
    Loading,
    Loaded,
}

impl From<LessonStatus> for LessonState {
    fn from(status: LessonStatus) -> Self {
        match status {
            LessonStatus::NoCategory => LessonState::NoCategory,
            LessonStatus::Loading => LessonState::Loading,
            LessonStatus::Loaded => LessonState::Loaded,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct LessonSessionView {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(example = "Grammar")]
    pub category: Option<String>,
    pub state: LessonState,
    pub loading: bool,
    pub lines: Vec<LineView>,
    /// Alerts raised since the previous view of this session.
    pub alerts: Vec<AlertView>,
}

impl LessonSessionView {
    pub fn new(session_id: Uuid, session: &LessonSession, alerts: Vec<Alert>) -> Self {
        Self {
            session_id,
            category: session.active().map(|key| key.to_string()),
            state: session.status().into(),
            loading: session.is_loading(),
            lines: session
                .content()
                .display_lines()
                .into_iter()
                .map(LineView::from)
                .collect(),
            alerts: alerts.into_iter().map(AlertView::from).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct CategoriesView {
    #[schema(example = json!(["Grammar", "Vocabulary"]))]
    pub categories: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitMessagePayload {
    #[schema(example = "I goes to school every day.")]
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SelectCategoryPayload {
    #[schema(example = "Grammar")]
    pub category: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CustomLessonPayload {
    #[schema(example = "Phrasal verbs")]
    pub title: String,
    #[schema(example = "Give up = stop trying. لا تستسلم")]
    pub body: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
