//! # Database Module
//!
//! Postgres implementations of the persistence collaborators.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::errors::BotResult;
use crate::model::{
    FaceId, MediaKind, NewFace, SavedFace, SwapRecord, UserId, UserPreferences,
};
use crate::persistence::{FaceStore, HistoryStore, PreferenceStore, RateLimitStore};
use crate::rate_limiter::ActionKind;

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS saved_faces (
            id BIGSERIAL PRIMARY KEY,
            owner_id BIGINT NOT NULL,
            name VARCHAR(64) NOT NULL,
            locator TEXT NOT NULL,
            thumbnail TEXT,
            usage_count BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (owner_id, name)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create saved_faces table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_preferences (
            user_id BIGINT PRIMARY KEY,
            default_face_id BIGINT REFERENCES saved_faces(id) ON DELETE SET NULL,
            auto_detect_gifs BOOLEAN NOT NULL DEFAULT TRUE,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_preferences table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS swap_history (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            chat_id BIGINT NOT NULL,
            target_locator TEXT NOT NULL,
            face_id BIGINT,
            job_id TEXT NOT NULL,
            result_url TEXT NOT NULL,
            credits_charged BIGINT,
            media_kind VARCHAR(16) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create swap_history table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_swap_history_user ON swap_history (user_id, created_at DESC)",
    )
    .execute(pool)
    .await
    .context("Failed to create swap_history index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS rate_limit_windows (
            user_id BIGINT NOT NULL,
            action_kind VARCHAR(32) NOT NULL,
            timestamps TIMESTAMPTZ[] NOT NULL DEFAULT '{}',
            PRIMARY KEY (user_id, action_kind)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create rate_limit_windows table")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn face_from_row(row: &PgRow) -> Result<SavedFace, sqlx::Error> {
    Ok(SavedFace {
        id: row.try_get("id")?,
        owner_id: row.try_get::<i64, _>("owner_id")? as UserId,
        name: row.try_get("name")?,
        locator: row.try_get("locator")?,
        thumbnail: row.try_get("thumbnail")?,
        usage_count: row.try_get("usage_count")?,
        created_at: row.try_get("created_at")?,
    })
}

fn swap_from_row(row: &PgRow) -> Result<SwapRecord, sqlx::Error> {
    let kind: String = row.try_get("media_kind")?;
    Ok(SwapRecord {
        user_id: row.try_get::<i64, _>("user_id")? as UserId,
        chat_id: row.try_get("chat_id")?,
        target_locator: row.try_get("target_locator")?,
        face_id: row.try_get("face_id")?,
        job_id: row.try_get("job_id")?,
        result_url: row.try_get("result_url")?,
        credits_charged: row.try_get("credits_charged")?,
        media_kind: MediaKind::from_str_opt(&kind).unwrap_or(MediaKind::Image),
        created_at: row.try_get("created_at")?,
    })
}

/// Shared Postgres store implementing every persistence trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FaceStore for PgStore {
    async fn list_faces(&self, owner_id: UserId) -> BotResult<Vec<SavedFace>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, name, locator, thumbnail, usage_count, created_at
             FROM saved_faces WHERE owner_id = $1 ORDER BY created_at, id",
        )
        .bind(owner_id as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(face_from_row).collect::<Result<_, _>>()?)
    }

    async fn get_face(&self, face_id: FaceId) -> BotResult<Option<SavedFace>> {
        let row = sqlx::query(
            "SELECT id, owner_id, name, locator, thumbnail, usage_count, created_at
             FROM saved_faces WHERE id = $1",
        )
        .bind(face_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(face_from_row).transpose()?)
    }

    async fn insert_face(&self, face: NewFace) -> BotResult<SavedFace> {
        debug!(owner_id = face.owner_id, name = %face.name, "Inserting saved face");
        let row = sqlx::query(
            "INSERT INTO saved_faces (owner_id, name, locator, thumbnail)
             VALUES ($1, $2, $3, $4)
             RETURNING id, owner_id, name, locator, thumbnail, usage_count, created_at",
        )
        .bind(face.owner_id as i64)
        .bind(&face.name)
        .bind(&face.locator)
        .bind(&face.thumbnail)
        .fetch_one(&self.pool)
        .await?;

        let saved = face_from_row(&row)?;
        info!(face_id = saved.id, owner_id = saved.owner_id, "Saved face created");
        Ok(saved)
    }

    async fn delete_face(&self, owner_id: UserId, face_id: FaceId) -> BotResult<bool> {
        let result = sqlx::query("DELETE FROM saved_faces WHERE id = $1 AND owner_id = $2")
            .bind(face_id)
            .bind(owner_id as i64)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!(face_id, owner_id, "Saved face deleted");
            Ok(true)
        } else {
            debug!(face_id, owner_id, "No saved face deleted");
            Ok(false)
        }
    }

    async fn increment_usage(&self, face_id: FaceId) -> BotResult<()> {
        sqlx::query("UPDATE saved_faces SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(face_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for PgStore {
    async fn get_preferences(&self, user_id: UserId) -> BotResult<UserPreferences> {
        let row = sqlx::query(
            "SELECT default_face_id, auto_detect_gifs FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(UserPreferences {
                default_face_id: row.try_get("default_face_id")?,
                auto_detect_gifs: row.try_get("auto_detect_gifs")?,
            }),
            None => Ok(UserPreferences::default()),
        }
    }

    async fn set_preferences(
        &self,
        user_id: UserId,
        preferences: &UserPreferences,
    ) -> BotResult<()> {
        sqlx::query(
            "INSERT INTO user_preferences (user_id, default_face_id, auto_detect_gifs, updated_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (user_id) DO UPDATE
             SET default_face_id = EXCLUDED.default_face_id,
                 auto_detect_gifs = EXCLUDED.auto_detect_gifs,
                 updated_at = NOW()",
        )
        .bind(user_id as i64)
        .bind(preferences.default_face_id)
        .bind(preferences.auto_detect_gifs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn insert_swap(&self, record: &SwapRecord) -> BotResult<()> {
        sqlx::query(
            "INSERT INTO swap_history
             (user_id, chat_id, target_locator, face_id, job_id, result_url, credits_charged, media_kind, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.user_id as i64)
        .bind(record.chat_id)
        .bind(&record.target_locator)
        .bind(record.face_id)
        .bind(&record.job_id)
        .bind(&record.result_url)
        .bind(record.credits_charged)
        .bind(record.media_kind.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_swaps(&self, user_id: UserId, limit: usize) -> BotResult<Vec<SwapRecord>> {
        let rows = sqlx::query(
            "SELECT user_id, chat_id, target_locator, face_id, job_id, result_url,
                    credits_charged, media_kind, created_at
             FROM swap_history WHERE user_id = $1
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(user_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(swap_from_row).collect::<Result<_, _>>()?)
    }
}

#[async_trait]
impl RateLimitStore for PgStore {
    async fn load_window(
        &self,
        user_id: UserId,
        kind: ActionKind,
    ) -> BotResult<Vec<DateTime<Utc>>> {
        let timestamps: Option<Vec<DateTime<Utc>>> = sqlx::query_scalar(
            "SELECT timestamps FROM rate_limit_windows WHERE user_id = $1 AND action_kind = $2",
        )
        .bind(user_id as i64)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(timestamps.unwrap_or_default())
    }

    async fn save_window(
        &self,
        user_id: UserId,
        kind: ActionKind,
        timestamps: &[DateTime<Utc>],
    ) -> BotResult<()> {
        sqlx::query(
            "INSERT INTO rate_limit_windows (user_id, action_kind, timestamps)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id, action_kind) DO UPDATE SET timestamps = EXCLUDED.timestamps",
        )
        .bind(user_id as i64)
        .bind(kind.as_str())
        .bind(timestamps)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
