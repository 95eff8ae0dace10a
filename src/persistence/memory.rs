//! In-memory persistence used in tests and when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{FaceStore, HistoryStore, PreferenceStore, RateLimitStore};
use crate::errors::BotResult;
use crate::model::{FaceId, NewFace, SavedFace, SwapRecord, UserId, UserPreferences};
use crate::rate_limiter::ActionKind;

#[derive(Default)]
struct FaceTable {
    next_id: FaceId,
    rows: Vec<SavedFace>,
}

#[derive(Default)]
pub struct MemoryFaceStore {
    table: Mutex<FaceTable>,
}

#[async_trait]
impl FaceStore for MemoryFaceStore {
    async fn list_faces(&self, owner_id: UserId) -> BotResult<Vec<SavedFace>> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .iter()
            .filter(|face| face.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn get_face(&self, face_id: FaceId) -> BotResult<Option<SavedFace>> {
        let table = self.table.lock().await;
        Ok(table.rows.iter().find(|face| face.id == face_id).cloned())
    }

    async fn insert_face(&self, face: NewFace) -> BotResult<SavedFace> {
        let mut table = self.table.lock().await;
        table.next_id += 1;
        let saved = SavedFace {
            id: table.next_id,
            owner_id: face.owner_id,
            name: face.name,
            locator: face.locator,
            thumbnail: face.thumbnail,
            usage_count: 0,
            created_at: Utc::now(),
        };
        table.rows.push(saved.clone());
        Ok(saved)
    }

    async fn delete_face(&self, owner_id: UserId, face_id: FaceId) -> BotResult<bool> {
        let mut table = self.table.lock().await;
        let before = table.rows.len();
        table
            .rows
            .retain(|face| !(face.id == face_id && face.owner_id == owner_id));
        Ok(table.rows.len() != before)
    }

    async fn increment_usage(&self, face_id: FaceId) -> BotResult<()> {
        let mut table = self.table.lock().await;
        if let Some(face) = table.rows.iter_mut().find(|face| face.id == face_id) {
            face.usage_count += 1;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    rows: Mutex<HashMap<UserId, UserPreferences>>,
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get_preferences(&self, user_id: UserId) -> BotResult<UserPreferences> {
        Ok(self
            .rows
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_preferences(
        &self,
        user_id: UserId,
        preferences: &UserPreferences,
    ) -> BotResult<()> {
        self.rows.lock().await.insert(user_id, preferences.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    rows: Mutex<Vec<SwapRecord>>,
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert_swap(&self, record: &SwapRecord) -> BotResult<()> {
        self.rows.lock().await.push(record.clone());
        Ok(())
    }

    async fn recent_swaps(&self, user_id: UserId, limit: usize) -> BotResult<Vec<SwapRecord>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .rev()
            .filter(|record| record.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<(UserId, ActionKind), Vec<DateTime<Utc>>>>,
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn load_window(
        &self,
        user_id: UserId,
        kind: ActionKind,
    ) -> BotResult<Vec<DateTime<Utc>>> {
        Ok(self
            .windows
            .lock()
            .await
            .get(&(user_id, kind))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_window(
        &self,
        user_id: UserId,
        kind: ActionKind,
        timestamps: &[DateTime<Utc>],
    ) -> BotResult<()> {
        self.windows
            .lock()
            .await
            .insert((user_id, kind), timestamps.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_face(owner_id: UserId, name: &str) -> NewFace {
        NewFace {
            owner_id,
            name: name.to_string(),
            locator: format!("tg:{name}"),
            thumbnail: None,
        }
    }

    #[tokio::test]
    async fn test_face_store_scopes_by_owner() {
        let store = MemoryFaceStore::default();
        let alice = store.insert_face(new_face(1, "alice")).await.unwrap();
        store.insert_face(new_face(2, "bob")).await.unwrap();

        assert_eq!(store.list_faces(1).await.unwrap().len(), 1);
        assert!(!store.delete_face(2, alice.id).await.unwrap());
        assert!(store.delete_face(1, alice.id).await.unwrap());
        assert!(store.list_faces(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_usage_counter_increments() {
        let store = MemoryFaceStore::default();
        let face = store.insert_face(new_face(1, "me")).await.unwrap();
        store.increment_usage(face.id).await.unwrap();
        store.increment_usage(face.id).await.unwrap();
        let face = store.get_face(face.id).await.unwrap().unwrap();
        assert_eq!(face.usage_count, 2);
    }
}
