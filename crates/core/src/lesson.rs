//! Lesson State Machine
//!
//! Owns the active category, the per-session [`CategoryCache`], the lesson
//! lines on display and the loading flag of one lesson session.
//!
//! Selecting a cached category displays it at once. Selecting an uncached one
//! fetches, normalizes and caches it. The advanced variant always fetches and
//! never touches the cache. A custom lesson is inserted locally with no
//! backend involvement. Only the latest dispatched fetch may change what is
//! displayed; failures raise an alert and leave the display as it was.

use crate::{
    alert::{Alert, AlertSurface},
    cache::CategoryCache,
    category::CategoryKey,
    completion::{Completion, CompletionClient, CompletionError, CompletionRequest, ValidationError},
    normalize::{LessonContent, normalize_lesson},
    prompts::{LessonVariant, Prompts},
    request::{Abandon, InFlight, RequestTicket, RequestTracker, Settled},
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const LESSON_LOAD_FAILED: &str = "Could not load the lesson. Try again later.";
pub const ADVANCED_LOAD_FAILED: &str = "Could not load the advanced lesson. Try again later.";
pub const EMPTY_CUSTOM_LESSON: &str = "Please provide a lesson content.";
pub const CUSTOM_LESSON_ADDED: &str = "New lesson added!";

/// Where a lesson session stands.
///
/// A failed or cancelled fetch puts both the status and the active category
/// back to what they were before loading began, so the two always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    NoCategory,
    Loading,
    Loaded,
}

/// Identifies what a dispatched lesson fetch was for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonTicket {
    pub request: RequestTicket,
    pub key: CategoryKey,
    pub variant: LessonVariant,
}

/// A dispatched lesson fetch, waiting to be sent.
#[derive(Debug)]
pub struct PendingLesson {
    pub ticket: LessonTicket,
    pub request: CompletionRequest,
    pub cancel: CancellationToken,
}

/// Result of selecting a category.
#[derive(Debug)]
pub enum Selection {
    /// The cached content is already on display.
    CacheHit,
    Fetch(PendingLesson),
}

/// State of one lesson session.
pub struct LessonSession {
    active: Option<CategoryKey>,
    content: LessonContent,
    status: LessonStatus,
    status_before_loading: LessonStatus,
    active_before_loading: Option<CategoryKey>,
    cache: CategoryCache,
    tracker: RequestTracker,
    prompts: Arc<Prompts>,
    alerts: Arc<dyn AlertSurface>,
}

impl LessonSession {
    pub fn new(prompts: Arc<Prompts>, alerts: Arc<dyn AlertSurface>) -> Self {
        Self::with_cache(prompts, alerts, CategoryCache::new())
    }

    pub fn with_cache(
        prompts: Arc<Prompts>,
        alerts: Arc<dyn AlertSurface>,
        cache: CategoryCache,
    ) -> Self {
        Self {
            active: None,
            content: LessonContent::empty(),
            status: LessonStatus::NoCategory,
            status_before_loading: LessonStatus::NoCategory,
            active_before_loading: None,
            cache,
            tracker: RequestTracker::new(),
            prompts,
            alerts,
        }
    }

    pub fn active(&self) -> Option<&CategoryKey> {
        self.active.as_ref()
    }

    pub fn content(&self) -> &LessonContent {
        &self.content
    }

    pub fn status(&self) -> LessonStatus {
        self.status
    }

    pub fn is_loading(&self) -> bool {
        self.status == LessonStatus::Loading
    }

    pub fn cache(&self) -> &CategoryCache {
        &self.cache
    }

    /// Makes `key` active and either shows it from cache or dispatches a fetch.
    pub fn begin_select(&mut self, key: CategoryKey) -> Result<Selection, ValidationError> {
        validate_key(&key)?;
        let request = self.prompts.lesson_request(&key, LessonVariant::Standard)?;

        if let Some(cached) = self.cache.lookup(&key) {
            // Anything still loading would otherwise overwrite this.
            self.cancel_loading();
            self.active = Some(key);
            self.content = cached;
            self.status = LessonStatus::Loaded;
            return Ok(Selection::CacheHit);
        }

        Ok(Selection::Fetch(self.dispatch(key, LessonVariant::Standard, request)))
    }

    /// Dispatches an uncached advanced fetch for `key`.
    pub fn begin_advanced(&mut self, key: CategoryKey) -> Result<PendingLesson, ValidationError> {
        validate_key(&key)?;
        let request = self.prompts.lesson_request(&key, LessonVariant::Advanced)?;
        Ok(self.dispatch(key, LessonVariant::Advanced, request))
    }

    fn dispatch(
        &mut self,
        key: CategoryKey,
        variant: LessonVariant,
        request: CompletionRequest,
    ) -> PendingLesson {
        let previous = self.active.replace(key.clone());
        if self.status != LessonStatus::Loading {
            self.status_before_loading = self.status;
            self.active_before_loading = previous;
        }
        let (ticket, cancel) = self.tracker.issue();
        self.status = LessonStatus::Loading;
        debug!(%ticket, category = %key, ?variant, "Lesson fetch dispatched");
        PendingLesson {
            ticket: LessonTicket {
                request: ticket,
                key,
                variant,
            },
            request,
            cancel,
        }
    }

    /// Applies the outcome of a fetch if it is still the latest one.
    pub fn finish_fetch(
        &mut self,
        ticket: LessonTicket,
        outcome: Result<Completion, CompletionError>,
    ) -> Settled {
        if !self.tracker.settle(ticket.request) {
            debug!(ticket = %ticket.request, category = %ticket.key, "Discarding stale lesson reply");
            return Settled::Discarded;
        }

        match outcome {
            Ok(completion) => {
                let content = match completion {
                    Completion::Text(text) => normalize_lesson(&text),
                    Completion::Empty => normalize_lesson(""),
                };
                if ticket.variant == LessonVariant::Standard {
                    self.cache.store(ticket.key.clone(), content.clone());
                }
                info!(category = %ticket.key, lines = content.len(), variant = ?ticket.variant, "Lesson loaded");
                self.content = content;
                self.status = LessonStatus::Loaded;
                Settled::Applied
            }
            Err(CompletionError::Cancelled) => {
                self.restore_before_loading();
                Settled::Discarded
            }
            Err(e) => {
                warn!(category = %ticket.key, error = %e, variant = ?ticket.variant, "Lesson fetch failed");
                self.restore_before_loading();
                let message = match ticket.variant {
                    LessonVariant::Standard => LESSON_LOAD_FAILED,
                    LessonVariant::Advanced => ADVANCED_LOAD_FAILED,
                };
                self.alerts.show(Alert::error(message));
                Settled::Applied
            }
        }
    }

    /// Selects `key` and, on a cache miss, waits for the fetch.
    #[instrument(name = "lesson_select", skip_all, fields(category = %key))]
    pub async fn select_category(
        &mut self,
        client: &dyn CompletionClient,
        key: CategoryKey,
    ) -> Result<Settled, ValidationError> {
        match self.begin_select(key)? {
            Selection::CacheHit => Ok(Settled::Applied),
            Selection::Fetch(pending) => Ok(self.drive(client, pending).await),
        }
    }

    /// Fetches the advanced lesson for `key`, bypassing the cache.
    #[instrument(name = "lesson_advanced", skip_all, fields(category = %key))]
    pub async fn fetch_advanced(
        &mut self,
        client: &dyn CompletionClient,
        key: CategoryKey,
    ) -> Result<Settled, ValidationError> {
        let pending = self.begin_advanced(key)?;
        Ok(self.drive(client, pending).await)
    }

    async fn drive(&mut self, client: &dyn CompletionClient, pending: PendingLesson) -> Settled {
        let PendingLesson {
            ticket,
            request,
            cancel,
        } = pending;
        let guard = InFlight::new(self, ticket.request);
        let outcome = client.complete(request, cancel).await;
        guard.finish(|session, _| session.finish_fetch(ticket, outcome))
    }

    /// Puts a user-authored lesson in front of the displayed lines.
    ///
    /// `title` becomes the active category. Neither the cache nor the network
    /// is touched. A blank `body` is rejected with an alert.
    pub fn add_custom_lesson(&mut self, title: &str, body: &str) -> Result<(), ValidationError> {
        if body.trim().is_empty() {
            self.alerts.show(Alert::error(EMPTY_CUSTOM_LESSON));
            return Err(ValidationError::EmptyInput);
        }
        self.cancel_loading();
        self.content.prepend(body);
        self.active = Some(CategoryKey::new(title));
        self.status = LessonStatus::Loaded;
        info!(title = %title, "Custom lesson added");
        self.alerts.show(Alert::success(CUSTOM_LESSON_ADDED));
        Ok(())
    }

    /// Cancels any fetch in flight. Used when the session goes away.
    pub fn close(&mut self) {
        self.cancel_loading();
    }

    fn cancel_loading(&mut self) {
        if let Some(ticket) = self.tracker.invalidate() {
            info!(%ticket, "Cancelled an in-flight lesson fetch");
            self.restore_before_loading();
        }
    }

    fn restore_before_loading(&mut self) {
        self.status = self.status_before_loading;
        self.active = self.active_before_loading.take();
    }
}

fn validate_key(key: &CategoryKey) -> Result<(), ValidationError> {
    if key.as_str().trim().is_empty() {
        Err(ValidationError::EmptyInput)
    } else {
        Ok(())
    }
}

impl Abandon for LessonSession {
    fn abandon(&mut self, ticket: RequestTicket) {
        if self.tracker.is_current(ticket) {
            warn!(%ticket, "Lesson fetch abandoned before it settled");
            self.cancel_loading();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alert::MockAlertSurface,
        cache::{CacheStats, MockLessonStore},
        completion::MockCompletionClient,
        normalize::NO_CONTENT,
    };
    use mockall::predicate::eq;

    fn quiet_alerts() -> Arc<dyn AlertSurface> {
        let mut alerts = MockAlertSurface::new();
        alerts.expect_show().never();
        Arc::new(alerts)
    }

    fn expect_alert(message: &'static str) -> Arc<dyn AlertSurface> {
        let mut alerts = MockAlertSurface::new();
        alerts
            .expect_show()
            .with(eq(Alert::error(message)))
            .times(1)
            .return_const(());
        Arc::new(alerts)
    }

    fn session(alerts: Arc<dyn AlertSurface>) -> LessonSession {
        LessonSession::new(Arc::new(Prompts::default()), alerts)
    }

    fn replying(times: usize, reply: &'static str) -> MockCompletionClient {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .times(times)
            .returning(move |_, _| Ok(Completion::Text(reply.to_string())));
        client
    }

    #[tokio::test]
    async fn test_cache_miss_fetches_and_stores() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .withf(|request, _| {
                request.user_text().contains("\"Grammar\"") && request.max_tokens() == Some(1000)
            })
            .times(1)
            .returning(|_, _| Ok(Completion::Text("1. Nouns\n\n2. Verbs\n".into())));

        let mut s = session(quiet_alerts());
        assert_eq!(s.status(), LessonStatus::NoCategory);
        s.select_category(&client, "Grammar".into()).await.unwrap();

        assert_eq!(s.content().lines(), ["1. Nouns", "2. Verbs"]);
        assert_eq!(s.active().map(CategoryKey::as_str), Some("Grammar"));
        assert_eq!(s.status(), LessonStatus::Loaded);
        assert_eq!(s.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_never_refetches() {
        let client = replying(1, "a\nb");
        let mut s = session(quiet_alerts());

        s.select_category(&client, "Grammar".into()).await.unwrap();
        s.select_category(&client, "Grammar".into()).await.unwrap();
        s.select_category(&client, "Grammar".into()).await.unwrap();

        assert_eq!(s.content().lines(), ["a", "b"]);
        assert_eq!(s.cache().stats(), CacheStats { hits: 2, misses: 1 });
    }

    #[test]
    fn test_cache_hit_skips_loading() {
        let mut store = MockLessonStore::new();
        store
            .expect_get()
            .returning(|_| Some(normalize_lesson("cached line")));
        store.expect_put().never();
        store.expect_len().return_const(1usize);

        let mut s = LessonSession::with_cache(
            Arc::new(Prompts::default()),
            quiet_alerts(),
            CategoryCache::with_store(Box::new(store)),
        );
        assert!(matches!(
            s.begin_select("Idioms".into()).unwrap(),
            Selection::CacheHit
        ));
        assert_eq!(s.status(), LessonStatus::Loaded);
        assert_eq!(s.content().lines(), ["cached line"]);
    }

    #[tokio::test]
    async fn test_failure_alerts_and_keeps_content() {
        let mut client = MockCompletionClient::new();
        client.expect_complete().times(1).returning(|_, _| {
            Err(CompletionError::ServiceError {
                status: Some(500),
                message: None,
            })
        });

        let mut s = session(expect_alert(LESSON_LOAD_FAILED));
        s.select_category(&client, "Grammar".into()).await.unwrap();

        assert!(s.content().is_empty());
        assert!(!s.is_loading());
        assert_eq!(s.status(), LessonStatus::NoCategory);
        assert_eq!(s.active(), None);
        assert!(s.cache().is_empty());
    }

    #[tokio::test]
    async fn test_failure_after_load_returns_to_loaded() {
        let mut client = MockCompletionClient::new();
        let mut calls = 0;
        client.expect_complete().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(Completion::Text("grammar point".into()))
            } else {
                Err(CompletionError::NetworkFailure("offline".into()))
            }
        });

        let mut s = session(expect_alert(LESSON_LOAD_FAILED));
        s.select_category(&client, "Grammar".into()).await.unwrap();
        s.select_category(&client, "Vocabulary".into()).await.unwrap();

        assert_eq!(s.content().lines(), ["grammar point"]);
        assert_eq!(s.status(), LessonStatus::Loaded);
        assert_eq!(s.active().map(CategoryKey::as_str), Some("Grammar"));
    }

    #[tokio::test]
    async fn test_empty_reply_shows_sentinel() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .returning(|_, _| Ok(Completion::Empty));

        let mut s = session(quiet_alerts());
        s.select_category(&client, "Idioms".into()).await.unwrap();
        assert_eq!(s.content().lines(), [NO_CONTENT]);
    }

    #[tokio::test]
    async fn test_advanced_bypasses_cache() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .withf(|request, _| request.system_role().contains("advanced"))
            .times(2)
            .returning(|_, _| Ok(Completion::Text("advanced point".into())));
        client
            .expect_complete()
            .withf(|request, _| !request.system_role().contains("advanced"))
            .times(1)
            .returning(|_, _| Ok(Completion::Text("basic point".into())));

        let mut s = session(quiet_alerts());
        s.select_category(&client, "Grammar".into()).await.unwrap();
        s.fetch_advanced(&client, "Grammar".into()).await.unwrap();
        s.fetch_advanced(&client, "Grammar".into()).await.unwrap();
        assert_eq!(s.content().lines(), ["advanced point"]);

        // The cached standard lesson is untouched.
        s.select_category(&client, "Grammar".into()).await.unwrap();
        assert_eq!(s.content().lines(), ["basic point"]);
        assert_eq!(s.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_advanced_failure_alerts() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .returning(|_, _| Err(CompletionError::NetworkFailure("dns".into())));

        let mut s = session(expect_alert(ADVANCED_LOAD_FAILED));
        s.fetch_advanced(&client, "Idioms".into()).await.unwrap();
        assert!(!s.is_loading());
        assert_eq!(s.status(), LessonStatus::NoCategory);
        assert_eq!(s.active(), None);
    }

    #[tokio::test]
    async fn test_custom_lesson_prepends_without_network() {
        let client = replying(1, "existing");
        let mut alerts = MockAlertSurface::new();
        alerts
            .expect_show()
            .with(eq(Alert::success(CUSTOM_LESSON_ADDED)))
            .times(1)
            .return_const(());

        let mut s = session(Arc::new(alerts));
        s.select_category(&client, "Grammar".into()).await.unwrap();
        s.add_custom_lesson("My Title", "My Body").unwrap();

        assert_eq!(s.content().lines(), ["My Body", "existing"]);
        assert_eq!(s.active().map(CategoryKey::as_str), Some("My Title"));
        assert_eq!(s.cache().len(), 1);
    }

    #[test]
    fn test_blank_custom_lesson_rejected() {
        let mut s = session(expect_alert(EMPTY_CUSTOM_LESSON));
        assert_eq!(
            s.add_custom_lesson("Title", "   "),
            Err(ValidationError::EmptyInput)
        );
        assert!(s.content().is_empty());
        assert_eq!(s.active(), None);
    }

    #[test]
    fn test_stale_fetch_is_discarded() {
        let mut s = session(quiet_alerts());
        let Selection::Fetch(grammar) = s.begin_select("Grammar".into()).unwrap() else {
            panic!("expected a fetch");
        };
        let Selection::Fetch(idioms) = s.begin_select("Idioms".into()).unwrap() else {
            panic!("expected a fetch");
        };
        assert!(grammar.cancel.is_cancelled());

        assert_eq!(
            s.finish_fetch(idioms.ticket, Ok(Completion::Text("idiom".into()))),
            Settled::Applied
        );
        assert_eq!(
            s.finish_fetch(grammar.ticket, Ok(Completion::Text("grammar".into()))),
            Settled::Discarded
        );
        assert_eq!(s.content().lines(), ["idiom"]);
        assert_eq!(s.active().map(CategoryKey::as_str), Some("Idioms"));
        assert_eq!(s.cache().len(), 1);
    }

    #[test]
    fn test_cache_hit_supersedes_in_flight_fetch() {
        let mut s = session(quiet_alerts());
        let Selection::Fetch(grammar) = s.begin_select("Grammar".into()).unwrap() else {
            panic!("expected a fetch");
        };
        s.finish_fetch(grammar.ticket, Ok(Completion::Text("grammar".into())));

        let Selection::Fetch(idioms) = s.begin_select("Idioms".into()).unwrap() else {
            panic!("expected a fetch");
        };
        assert!(matches!(
            s.begin_select("Grammar".into()).unwrap(),
            Selection::CacheHit
        ));
        assert!(idioms.cancel.is_cancelled());
        assert_eq!(
            s.finish_fetch(idioms.ticket, Ok(Completion::Text("idiom".into()))),
            Settled::Discarded
        );
        assert_eq!(s.content().lines(), ["grammar"]);
        assert_eq!(s.status(), LessonStatus::Loaded);
    }

    #[test]
    fn test_custom_lesson_supersedes_in_flight_fetch() {
        let mut alerts = MockAlertSurface::new();
        alerts.expect_show().return_const(());
        let mut s = session(Arc::new(alerts));
        let Selection::Fetch(pending) = s.begin_select("Grammar".into()).unwrap() else {
            panic!("expected a fetch");
        };
        s.add_custom_lesson("Mine", "My notes").unwrap();
        assert_eq!(
            s.finish_fetch(pending.ticket, Ok(Completion::Text("grammar".into()))),
            Settled::Discarded
        );
        assert_eq!(s.content().lines(), ["My notes"]);
        assert_eq!(s.status(), LessonStatus::Loaded);
    }

    #[test]
    fn test_close_cancels_fetch() {
        let mut s = session(quiet_alerts());
        let Selection::Fetch(pending) = s.begin_select("Grammar".into()).unwrap() else {
            panic!("expected a fetch");
        };
        s.close();
        assert!(pending.cancel.is_cancelled());
        assert!(!s.is_loading());
        assert_eq!(s.status(), LessonStatus::NoCategory);
        assert_eq!(s.active(), None);
        assert_eq!(
            s.finish_fetch(pending.ticket, Err(CompletionError::Cancelled)),
            Settled::Discarded
        );
    }

    #[test]
    fn test_blank_category_rejected() {
        let mut s = session(quiet_alerts());
        assert!(matches!(
            s.begin_select("  ".into()),
            Err(ValidationError::EmptyInput)
        ));
        assert!(s.begin_advanced("".into()).is_err());
        assert_eq!(s.active(), None);
        assert_eq!(s.status(), LessonStatus::NoCategory);
    }
}
