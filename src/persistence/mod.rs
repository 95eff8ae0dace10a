//! # Persistence Module
//!
//! Collaborator interfaces for saved faces, preferences, swap history and
//! rate-limit windows. The orchestrator only talks to these traits; the
//! Postgres implementations live in [`crate::db`] and the in-memory ones in
//! [`memory`].

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::BotResult;
use crate::model::{FaceId, NewFace, SavedFace, SwapRecord, UserId, UserPreferences};
use crate::rate_limiter::ActionKind;

/// Saved-face CRUD scoped by owner
#[async_trait]
pub trait FaceStore: Send + Sync {
    /// Faces owned by `owner_id`, oldest first
    async fn list_faces(&self, owner_id: UserId) -> BotResult<Vec<SavedFace>>;
    async fn get_face(&self, face_id: FaceId) -> BotResult<Option<SavedFace>>;
    async fn insert_face(&self, face: NewFace) -> BotResult<SavedFace>;
    /// Returns false when no face with that id belongs to `owner_id`
    async fn delete_face(&self, owner_id: UserId, face_id: FaceId) -> BotResult<bool>;
    async fn increment_usage(&self, face_id: FaceId) -> BotResult<()>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_preferences(&self, user_id: UserId) -> BotResult<UserPreferences>;
    async fn set_preferences(&self, user_id: UserId, preferences: &UserPreferences)
        -> BotResult<()>;
}

/// Append-only swap history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert_swap(&self, record: &SwapRecord) -> BotResult<()>;
    /// Most recent first
    async fn recent_swaps(&self, user_id: UserId, limit: usize) -> BotResult<Vec<SwapRecord>>;
}

/// Timestamp windows per (user, action kind)
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn load_window(&self, user_id: UserId, kind: ActionKind)
        -> BotResult<Vec<DateTime<Utc>>>;
    async fn save_window(
        &self,
        user_id: UserId,
        kind: ActionKind,
        timestamps: &[DateTime<Utc>],
    ) -> BotResult<()>;
}

/// Bundle of persistence collaborators handed to the orchestrator
#[derive(Clone)]
pub struct Persistence {
    pub faces: Arc<dyn FaceStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub history: Arc<dyn HistoryStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
}

impl Persistence {
    /// Process-local persistence, lost on restart
    pub fn in_memory() -> Self {
        Self {
            faces: Arc::new(memory::MemoryFaceStore::default()),
            preferences: Arc::new(memory::MemoryPreferenceStore::default()),
            history: Arc::new(memory::MemoryHistoryStore::default()),
            rate_limits: Arc::new(memory::MemoryRateLimitStore::default()),
        }
    }

    /// Postgres-backed persistence sharing one pool
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(crate::db::PgStore::new(pool));
        Self {
            faces: store.clone(),
            preferences: store.clone(),
            history: store.clone(),
            rate_limits: store,
        }
    }
}
