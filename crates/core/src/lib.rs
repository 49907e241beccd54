//! Conversation and lesson content engine for the Aima English tutor.
//!
//! The engine turns user input into completion requests, tracks the single
//! request each session may have in flight, caches lesson content per
//! category, and normalizes replies into displayable units. Rendering is left
//! to whichever surface drives the sessions.

pub mod alert;
pub mod cache;
pub mod category;
pub mod completion;
pub mod conversation;
pub mod lesson;
pub mod normalize;
pub mod prompts;
pub mod request;

pub use alert::{Alert, AlertSurface};
pub use category::{Category, CategoryKey};
pub use completion::{
    Completion, CompletionClient, CompletionConfig, CompletionError, CompletionRequest,
    HttpCompletionClient, ValidationError,
};
pub use conversation::{ConversationSession, RequestState, Sender, Turn};
pub use lesson::{LessonSession, LessonStatus};
pub use normalize::{LessonContent, TextDirection, classify_direction, normalize_lesson};
pub use prompts::{LessonVariant, Prompts};
pub use request::Settled;
