use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use faceswap_bot::db::*;
use faceswap_bot::model::{MediaKind, NewFace, SwapRecord, UserId, UserPreferences};
use faceswap_bot::persistence::{FaceStore, HistoryStore, PreferenceStore, RateLimitStore};
use faceswap_bot::rate_limiter::ActionKind;
use sqlx::PgPool;
use std::env;

/// Helper macro to skip tests when database is not available
macro_rules! skip_if_no_db {
    ($test_fn:expr) => {
        match setup_test_db().await {
            Ok(pool) => $test_fn(&pool).await,
            Err(_) => {
                eprintln!("Skipping test: Database not available");
                Ok(())
            }
        }
    };
}

async fn setup_test_db() -> Result<PgPool> {
    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping database tests: DATABASE_URL not set");
            return Err(anyhow::anyhow!("Test database not configured"));
        }
    };

    let pool = PgPool::connect(&database_url)
        .await
        .context("Failed to connect to test database")?;
    init_database_schema(&pool).await?;
    Ok(pool)
}

/// Remove rows left by an earlier run; every test owns its user id
async fn reset_user(pool: &PgPool, user_id: UserId) -> Result<()> {
    let id = user_id as i64;
    sqlx::query("DELETE FROM user_preferences WHERE user_id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM saved_faces WHERE owner_id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM swap_history WHERE user_id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM rate_limit_windows WHERE user_id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

fn new_face(owner_id: UserId, name: &str) -> NewFace {
    NewFace {
        owner_id,
        name: name.to_string(),
        locator: format!("tg:{name}-file"),
        thumbnail: None,
    }
}

#[tokio::test]
async fn test_saved_face_operations() -> Result<()> {
    skip_if_no_db!(test_saved_face_operations_impl)
}

async fn test_saved_face_operations_impl(pool: &PgPool) -> Result<()> {
    const OWNER: UserId = 910_001;
    reset_user(pool, OWNER).await?;
    let store = PgStore::new(pool.clone());

    let first = store.insert_face(new_face(OWNER, "Me")).await?;
    let second = store.insert_face(new_face(OWNER, "Boss")).await?;
    assert_eq!(first.owner_id, OWNER);
    assert_eq!(first.usage_count, 0);

    // Names are unique per owner
    assert!(store.insert_face(new_face(OWNER, "Me")).await.is_err());

    let faces = store.list_faces(OWNER).await?;
    assert_eq!(
        faces.iter().map(|f| f.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );

    store.increment_usage(first.id).await?;
    store.increment_usage(first.id).await?;
    let found = store.get_face(first.id).await?.unwrap();
    assert_eq!(found.usage_count, 2);
    assert_eq!(found.locator, "tg:Me-file");

    // Deletion is scoped by owner
    assert!(!store.delete_face(OWNER + 1, first.id).await?);
    assert!(store.delete_face(OWNER, first.id).await?);
    assert_eq!(store.get_face(first.id).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_preference_operations() -> Result<()> {
    skip_if_no_db!(test_preference_operations_impl)
}

async fn test_preference_operations_impl(pool: &PgPool) -> Result<()> {
    const USER: UserId = 910_002;
    reset_user(pool, USER).await?;
    let store = PgStore::new(pool.clone());

    assert_eq!(store.get_preferences(USER).await?, UserPreferences::default());

    let face = store.insert_face(new_face(USER, "Me")).await?;
    let preferences = UserPreferences {
        default_face_id: Some(face.id),
        auto_detect_gifs: false,
    };
    store.set_preferences(USER, &preferences).await?;
    assert_eq!(store.get_preferences(USER).await?, preferences);

    // Deleting the face clears the default
    store.delete_face(USER, face.id).await?;
    let after = store.get_preferences(USER).await?;
    assert_eq!(after.default_face_id, None);
    assert!(!after.auto_detect_gifs);

    Ok(())
}

#[tokio::test]
async fn test_history_operations() -> Result<()> {
    skip_if_no_db!(test_history_operations_impl)
}

async fn test_history_operations_impl(pool: &PgPool) -> Result<()> {
    const USER: UserId = 910_003;
    reset_user(pool, USER).await?;
    let store = PgStore::new(pool.clone());

    let start = Utc::now().trunc_subsecs(6);
    for i in 0..12 {
        store
            .insert_swap(&SwapRecord {
                user_id: USER,
                chat_id: -100,
                target_locator: format!("https://media.tenor.com/{i}.gif"),
                face_id: None,
                job_id: format!("job-{i}"),
                result_url: format!("https://cdn.example/{i}.mp4"),
                credits_charged: Some(i),
                media_kind: MediaKind::Gif,
                created_at: start + chrono::Duration::seconds(i),
            })
            .await?;
    }

    let recent = store.recent_swaps(USER, 10).await?;
    assert_eq!(recent.len(), 10);
    assert_eq!(recent[0].job_id, "job-11");
    assert_eq!(recent[9].job_id, "job-2");
    assert_eq!(recent[0].media_kind, MediaKind::Gif);
    assert_eq!(recent[0].created_at, start + chrono::Duration::seconds(11));

    Ok(())
}

#[tokio::test]
async fn test_rate_limit_window_operations() -> Result<()> {
    skip_if_no_db!(test_rate_limit_window_operations_impl)
}

async fn test_rate_limit_window_operations_impl(pool: &PgPool) -> Result<()> {
    const USER: UserId = 910_004;
    reset_user(pool, USER).await?;
    let store = PgStore::new(pool.clone());

    assert!(store.load_window(USER, ActionKind::Swap).await?.is_empty());

    let now = Utc::now().trunc_subsecs(6);
    let window = vec![now - chrono::Duration::minutes(2), now];
    store.save_window(USER, ActionKind::Swap, &window).await?;
    assert_eq!(store.load_window(USER, ActionKind::Swap).await?, window);
    assert!(store.load_window(USER, ActionKind::Search).await?.is_empty());

    store.save_window(USER, ActionKind::Swap, &[now]).await?;
    assert_eq!(store.load_window(USER, ActionKind::Swap).await?, vec![now]);

    Ok(())
}
