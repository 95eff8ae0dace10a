//! Session store with verify-on-write updates and TTL sweeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::types::{SessionId, SessionRecord, SessionState};
use crate::clock::{elapsed_between, Clock};
use crate::errors::{BotError, BotResult};
use crate::model::UserId;

/// Raw storage behind a [`SessionStore`]
#[async_trait]
pub trait SessionBackend<S: SessionRecord>: Send + Sync {
    /// Returns false when a session with the same id already exists
    async fn insert(&self, session: S) -> BotResult<bool>;
    async fn load(&self, id: &SessionId) -> BotResult<Option<S>>;
    async fn save(&self, session: S) -> BotResult<()>;
    async fn remove(&self, id: &SessionId) -> BotResult<Option<S>>;
    async fn all(&self) -> BotResult<Vec<S>>;
}

/// Process-local backend; sessions do not survive a restart
pub struct MemoryBackend<S> {
    sessions: Mutex<HashMap<SessionId, S>>,
}

impl<S> Default for MemoryBackend<S> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S: SessionRecord> SessionBackend<S> for MemoryBackend<S> {
    async fn insert(&self, session: S) -> BotResult<bool> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(session.id()) {
            return Ok(false);
        }
        sessions.insert(session.id().clone(), session);
        Ok(true)
    }

    async fn load(&self, id: &SessionId) -> BotResult<Option<S>> {
        Ok(self.sessions.lock().await.get(id).cloned())
    }

    async fn save(&self, session: S) -> BotResult<()> {
        self.sessions
            .lock()
            .await
            .insert(session.id().clone(), session);
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> BotResult<Option<S>> {
        Ok(self.sessions.lock().await.remove(id))
    }

    async fn all(&self) -> BotResult<Vec<S>> {
        Ok(self.sessions.lock().await.values().cloned().collect())
    }
}

/// Guard evaluated against the stored record before a patch is applied
#[derive(Debug, Clone, Copy, Default)]
pub struct Guard<'a> {
    /// Acting user; must equal the session owner when set
    pub actor: Option<UserId>,
    /// States the session must currently be in; empty means any non-terminal
    pub from: &'a [SessionState],
}

impl<'a> Guard<'a> {
    pub fn owner(actor: UserId) -> Self {
        Self {
            actor: Some(actor),
            from: &[],
        }
    }

    pub fn from_states(from: &'a [SessionState]) -> Self {
        Self { actor: None, from }
    }

    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Keyed session store for one kind of session
pub struct SessionStore<S: SessionRecord> {
    backend: Arc<dyn SessionBackend<S>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    write_lock: Mutex<()>,
}

impl<S: SessionRecord> SessionStore<S> {
    pub fn new(backend: Arc<dyn SessionBackend<S>>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            backend,
            clock,
            ttl,
            write_lock: Mutex::new(()),
        }
    }

    /// In-memory store with the given idle timeout
    pub fn in_memory(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryBackend::default()), clock, ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(&self, session: S) -> BotResult<S> {
        let id = session.id().clone();
        if !self.backend.insert(session.clone()).await? {
            error!(session_id = %id, "Session id collision");
            return Err(BotError::Storage(format!("session id collision: {id}")));
        }
        debug!(session_id = %id, "Session created");
        Ok(session)
    }

    pub async fn get(&self, id: &SessionId) -> BotResult<S> {
        self.backend
            .load(id)
            .await?
            .ok_or_else(|| BotError::SessionExpired(id.to_string()))
    }

    /// Apply a partial update and confirm it by reading the record back
    pub async fn update(&self, id: &SessionId, patch: &S::Patch) -> BotResult<S> {
        self.transition(id, Guard::default(), patch).await
    }

    /// Apply a patch only if the guard holds for the stored record.
    ///
    /// Ownership is checked first, then the current state against
    /// `guard.from`, then the state change named by the patch against the
    /// state machine. A failed guard leaves the session untouched.
    pub async fn transition(&self, id: &SessionId, guard: Guard<'_>, patch: &S::Patch) -> BotResult<S> {
        let _write = self.write_lock.lock().await;

        let mut session = self.get(id).await?;
        if let Some(actor) = guard.actor {
            if session.owner_id() != actor {
                return Err(BotError::Ownership { actor });
            }
        }

        let current = session.state();
        if current.is_terminal() || (!guard.from.is_empty() && !guard.from.contains(&current)) {
            return Err(BotError::InvalidTransition { from: current });
        }
        if let Some(next) = S::patch_state(patch) {
            if next != current && !current.can_transition_to(next) {
                return Err(BotError::InvalidTransition { from: current });
            }
        }

        let now = self.clock.now();
        session.apply(patch);
        session.touch(now);
        self.backend.save(session).await?;

        let stored = self.backend.load(id).await?;
        match stored {
            Some(stored) if stored.reflects(patch) && stored.last_touched() == now => {
                debug!(session_id = %id, patch = ?patch, "Session update verified");
                Ok(stored)
            }
            Some(_) => {
                error!(session_id = %id, patch = ?patch, "Session update failed verification");
                Err(BotError::VerificationFailed(id.to_string()))
            }
            None => Err(BotError::SessionExpired(id.to_string())),
        }
    }

    /// Refresh the idle timer without changing anything else
    pub async fn touch(&self, id: &SessionId) -> BotResult<()> {
        let _write = self.write_lock.lock().await;
        let mut session = self.get(id).await?;
        session.touch(self.clock.now());
        self.backend.save(session).await
    }

    pub async fn delete(&self, id: &SessionId) -> BotResult<Option<S>> {
        let _write = self.write_lock.lock().await;
        let removed = self.backend.remove(id).await?;
        if removed.is_some() {
            debug!(session_id = %id, "Session deleted");
        }
        Ok(removed)
    }

    /// Remove and return every session idle for longer than the TTL
    pub async fn sweep_expired(&self) -> BotResult<Vec<S>> {
        let _write = self.write_lock.lock().await;
        let now = self.clock.now();

        let mut expired = Vec::new();
        for session in self.backend.all().await? {
            if elapsed_between(session.last_touched(), now) > self.ttl {
                if let Some(removed) = self.backend.remove(session.id()).await? {
                    expired.push(removed);
                }
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Swept expired sessions");
        }
        Ok(expired)
    }

    /// Sessions owned by `owner_id`, in no particular order
    pub async fn find_owned(&self, owner_id: UserId) -> BotResult<Vec<S>> {
        Ok(self
            .backend
            .all()
            .await?
            .into_iter()
            .filter(|session| session.owner_id() == owner_id)
            .collect())
    }

    pub async fn len(&self) -> BotResult<usize> {
        Ok(self.backend.all().await?.len())
    }

    pub async fn is_empty(&self) -> BotResult<bool> {
        Ok(self.len().await? == 0)
    }
}
