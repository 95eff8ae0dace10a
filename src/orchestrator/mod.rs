//! # Session Orchestrator
//!
//! Drives every interactive flow from trigger to terminal state:
//! - `search`: paged GIF search and result selection
//! - `swap`: face selection, inline upload collection and cancellation
//! - `job`: staging, submission, polling and delivery of a swap
//! - `faces`: saved-face management, preferences and history
//! - `poller`: attempt-bounded polling behind a `Sleeper`
//!
//! Terminal sessions are deleted from their store immediately; their final
//! state stays queryable through a short-lived ledger.

pub mod faces;
pub mod job;
pub mod poller;
pub mod search;
pub mod swap;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::callback::CallbackAction;
use crate::circuit_breaker::CircuitBreaker;
use crate::clock::{elapsed_between, Clock};
use crate::collector::InputCollector;
use crate::config::{OrchestratorConfig, RateLimitConfig, RecoveryConfig};
use crate::dedup::SeenMessages;
use crate::errors::{BotError, BotResult};
use crate::gif_detection::detect_gif;
use crate::localization::t_lang;
use crate::model::{ChatId, InboundMessage, MessageId, UserId};
use crate::persistence::Persistence;
use crate::presentation::Prompt;
use crate::providers::{FaceSwapProvider, GifSearchProvider};
use crate::rate_limiter::RateLimiter;
use crate::session::{
    Guard, SearchSession, SessionId, SessionRecord, SessionState, SessionStore, SwapSession,
};
use crate::transport::ChatTransport;

pub use poller::{PollPolicy, Sleeper, TokioSleeper};
pub use swap::{SwapOrigin, SwapStarted};

const LEDGER_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Background work started by a trigger; dropping it detaches the task
pub type FlowTask = JoinHandle<()>;

/// Who acted, where, and in which language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub language_code: Option<String>,
}

impl Trigger {
    pub fn from_message(message: &InboundMessage) -> Self {
        Self {
            user_id: message.user_id,
            chat_id: message.chat_id,
            message_id: message.message_id,
            language_code: message.language_code.clone(),
        }
    }

    pub fn lang(&self) -> Option<&str> {
        self.language_code.as_deref()
    }
}

/// External collaborators the orchestrator is wired to
pub struct Collaborators {
    pub persistence: Persistence,
    pub face_swap: Arc<dyn FaceSwapProvider>,
    pub gif_search: Arc<dyn GifSearchProvider>,
    pub transport: Arc<dyn ChatTransport>,
    pub clock: Arc<dyn Clock>,
    pub sleeper: Arc<dyn Sleeper>,
}

/// What happened to an inbound message
#[derive(Debug)]
pub enum InboundOutcome {
    /// Handed to an open upload wait
    Consumed,
    /// A GIF was detected and a swap flow started
    SwapStarted(SwapStarted),
    Ignored,
}

/// Final states of recently ended sessions
struct TerminalLedger {
    entries: Mutex<HashMap<SessionId, (SessionState, DateTime<Utc>)>>,
}

impl TerminalLedger {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn record(&self, id: &SessionId, state: SessionState, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (_, at)| elapsed_between(*at, now) < LEDGER_RETENTION);
        entries.insert(id.clone(), (state, now));
    }

    fn get(&self, id: &SessionId) -> Option<SessionState> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(id).map(|(state, _)| *state)
    }
}

struct Inner {
    config: OrchestratorConfig,
    searches: SessionStore<SearchSession>,
    swaps: SessionStore<SwapSession>,
    rate_limiter: RateLimiter,
    persistence: Persistence,
    face_swap: Arc<dyn FaceSwapProvider>,
    gif_search: Arc<dyn GifSearchProvider>,
    transport: Arc<dyn ChatTransport>,
    collector: InputCollector,
    seen: SeenMessages,
    breaker: CircuitBreaker,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    ledger: TerminalLedger,
}

/// Cheaply cloneable handle shared by every handler and background task
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        rate_limits: RateLimitConfig,
        recovery: RecoveryConfig,
        deps: Collaborators,
    ) -> Self {
        let searches = SessionStore::in_memory(deps.clock.clone(), config.sessions.search_ttl);
        let swaps = SessionStore::in_memory(deps.clock.clone(), config.sessions.swap_ttl);
        Self::with_stores(config, rate_limits, recovery, deps, searches, swaps)
    }

    /// Build with caller-supplied session stores
    pub fn with_stores(
        config: OrchestratorConfig,
        rate_limits: RateLimitConfig,
        recovery: RecoveryConfig,
        deps: Collaborators,
        searches: SessionStore<SearchSession>,
        swaps: SessionStore<SwapSession>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(
            deps.persistence.rate_limits.clone(),
            deps.clock.clone(),
            rate_limits,
        );
        let seen = SeenMessages::new(config.sessions.dedup_window, deps.clock.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                searches,
                swaps,
                rate_limiter,
                persistence: deps.persistence,
                face_swap: deps.face_swap,
                gif_search: deps.gif_search,
                transport: deps.transport,
                collector: InputCollector::new(),
                seen,
                breaker: CircuitBreaker::new(recovery),
                clock: deps.clock,
                sleeper: deps.sleeper,
                ledger: TerminalLedger::new(),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Current state of a live session, or the final state of a recently
    /// ended one
    pub async fn session_state(&self, id: &SessionId) -> Option<SessionState> {
        if let Ok(session) = self.inner.swaps.get(id).await {
            return Some(session.state);
        }
        if let Ok(session) = self.inner.searches.get(id).await {
            return Some(session.state);
        }
        self.inner.ledger.get(id)
    }

    pub async fn swap_session(&self, id: &SessionId) -> BotResult<SwapSession> {
        self.inner.swaps.get(id).await
    }

    pub async fn search_session(&self, id: &SessionId) -> BotResult<SearchSession> {
        self.inner.searches.get(id).await
    }

    /// Whether an upload wait is open for this user in this chat
    pub fn is_collecting(&self, user_id: UserId, chat_id: ChatId) -> bool {
        self.inner.collector.is_waiting(user_id, chat_id)
    }

    /// Entry point for every non-command message: open upload waits get
    /// the first look, then GIF auto-detection.
    pub async fn handle_inbound(&self, message: &InboundMessage) -> BotResult<InboundOutcome> {
        if self.inner.collector.offer(message) {
            debug!(user_id = message.user_id, chat_id = message.chat_id, "Message consumed by input wait");
            return Ok(InboundOutcome::Consumed);
        }

        let Some(target) = detect_gif(message) else {
            return Ok(InboundOutcome::Ignored);
        };
        if !self
            .inner
            .seen
            .first_sighting(message.chat_id, message.message_id)
            .await
        {
            debug!(chat_id = message.chat_id, message_id = message.message_id, "Duplicate GIF message ignored");
            return Ok(InboundOutcome::Ignored);
        }

        let preferences = self
            .inner
            .persistence
            .preferences
            .get_preferences(message.user_id)
            .await?;
        if !preferences.auto_detect_gifs {
            return Ok(InboundOutcome::Ignored);
        }

        let trigger = Trigger::from_message(message);
        match self.start_swap(&trigger, target, SwapOrigin::Detected).await {
            Ok(started) => Ok(InboundOutcome::SwapStarted(started)),
            // Unsolicited detections stay quiet when the user is over the limit
            Err(BotError::RateLimited { .. }) => {
                debug!(user_id = message.user_id, "Auto-detected GIF skipped, rate limited");
                Ok(InboundOutcome::Ignored)
            }
            Err(e) => Err(e),
        }
    }

    /// Dispatch a decoded button press
    pub async fn handle_action(&self, actor: &Trigger, action: CallbackAction) -> BotResult<()> {
        match action {
            CallbackAction::SearchPage { session, step } => {
                self.navigate(actor, &session, step).await.map(|_| ())
            }
            CallbackAction::SearchSelect { session, index } => {
                self.select_result(actor, &session, index).await.map(|_| ())
            }
            CallbackAction::SearchCancel { session } => self.cancel_search(actor, &session).await,
            CallbackAction::SelectFace { session, face_id } => {
                self.select_face(actor, &session, face_id).await.map(|_| ())
            }
            CallbackAction::UploadFace { session } => {
                self.request_upload(actor, &session).await.map(|_| ())
            }
            CallbackAction::SwapCancel { session } => self.cancel_swap(actor, &session).await,
            CallbackAction::SetDefaultFace { face_id } => {
                self.set_default_face(actor, face_id).await
            }
            CallbackAction::DeleteFace { face_id } => self.delete_face(actor, face_id).await,
            CallbackAction::Noop => Ok(()),
        }
    }

    /// Cancel every cancellable session the user owns and any open upload
    /// wait in this chat. Returns how many flows were stopped.
    pub async fn cancel_all(&self, trigger: &Trigger) -> BotResult<usize> {
        let mut cancelled = 0;

        for session in self.inner.swaps.find_owned(trigger.user_id).await? {
            if session.state.is_cancellable() && self.cancel_swap(trigger, &session.id).await.is_ok() {
                cancelled += 1;
            }
        }
        for session in self.inner.searches.find_owned(trigger.user_id).await? {
            if session.state.is_cancellable()
                && self.cancel_search(trigger, &session.id).await.is_ok()
            {
                cancelled += 1;
            }
        }
        if self.inner.collector.cancel(trigger.user_id, trigger.chat_id) {
            cancelled += 1;
        }

        let key = if cancelled > 0 {
            "cancel-done"
        } else {
            "cancel-nothing"
        };
        self.inner
            .transport
            .send_text(trigger.chat_id, &t_lang(key, trigger.lang()))
            .await?;
        Ok(cancelled)
    }

    /// Remove idle sessions and tell their owners. Returns how many were
    /// removed.
    pub async fn sweep_expired(&self) -> BotResult<usize> {
        let swaps = self.inner.swaps.sweep_expired().await?;
        let searches = self.inner.searches.sweep_expired().await?;

        for session in &swaps {
            self.record_terminal(&session.id, SessionState::Expired);
            if session.upload_open {
                self.inner
                    .collector
                    .cancel(session.owner_id, session.prompt_chat_id());
            }
            let text = t_lang("swap-expired", session.language_code.as_deref());
            self.close_prompt(
                session.prompt_chat_id(),
                session.prompt.map(|prompt| prompt.message_id),
                &text,
            )
            .await;
        }
        for session in &searches {
            self.record_terminal(&session.id, SessionState::Expired);
            let text = t_lang("search-expired", session.language_code.as_deref());
            self.close_prompt(session.chat_id, session.message_id, &text)
                .await;
        }

        Ok(swaps.len() + searches.len())
    }

    /// Run `sweep_expired` on the configured interval until the runtime stops
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let period = self.inner.config.sessions.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match orchestrator.sweep_expired().await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "Expired sessions swept"),
                    Err(e) => error!(error = %e, "Session sweep failed"),
                }
            }
        })
    }

    /// Send the localized message for `error` to a chat
    pub async fn notify_error(&self, chat_id: ChatId, language_code: Option<&str>, error: &BotError) {
        let text = error.user_message(language_code);
        if let Err(e) = self.inner.transport.send_text(chat_id, &text).await {
            warn!(chat_id, error = %e, "Failed to deliver error message");
        }
    }

    fn record_terminal(&self, id: &SessionId, state: SessionState) {
        self.inner.ledger.record(id, state, self.inner.clock.now());
        info!(session_id = %id, state = ?state, "Session ended");
    }

    /// Move a session into a terminal state and delete it.
    ///
    /// The transition is best effort: a session that cannot legally move
    /// (already terminal, or failed verification) is still removed. Returns
    /// the last known record, or `None` when the session was already gone.
    async fn end_session<S: SessionRecord>(
        &self,
        store: &SessionStore<S>,
        id: &SessionId,
        state: SessionState,
    ) -> Option<S> {
        let transitioned = match store.transition(id, Guard::default(), &S::state_patch(state)).await {
            Ok(session) => Some(session),
            Err(BotError::SessionExpired(_)) => None,
            Err(e) => {
                debug!(session_id = %id, error = %e, "Terminal transition not applied");
                None
            }
        };

        let removed = match store.delete(id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(session_id = %id, error = %e, "Failed to delete ended session");
                None
            }
        };

        let session = transitioned.or(removed)?;
        self.record_terminal(id, state);
        Some(session)
    }

    /// Replace a prompt's text and drop its buttons, or post the text when
    /// there is no prompt to edit
    async fn close_prompt(&self, chat_id: ChatId, message_id: Option<MessageId>, text: &str) {
        let result = match message_id {
            Some(message_id) => {
                self.inner
                    .transport
                    .edit_prompt(chat_id, message_id, &Prompt::text(text))
                    .await
            }
            None => self.inner.transport.send_text(chat_id, text).await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(chat_id, error = %e, "Failed to update prompt");
        }
    }
}
