//! Sliding-window rate limiting over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use faceswap_bot::clock::ManualClock;
use faceswap_bot::config::{RateLimitConfig, WindowLimit};
use faceswap_bot::errors::BotError;
use faceswap_bot::persistence::memory::MemoryRateLimitStore;
use faceswap_bot::rate_limiter::{ActionKind, RateDecision, RateLimiter};

const USER: u64 = 42;

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

fn limiter(config: RateLimitConfig) -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let limiter = RateLimiter::new(
        Arc::new(MemoryRateLimitStore::default()),
        clock.clone(),
        config,
    );
    (limiter, clock)
}

#[tokio::test]
async fn test_short_window_reopens_after_oldest_leaves() -> Result<()> {
    let (limiter, clock) = limiter(RateLimitConfig {
        swap_windows: vec![WindowLimit::new(3, minutes(10))],
        ..Default::default()
    });

    limiter.check_and_record(USER, ActionKind::Swap).await?;
    clock.advance(minutes(1));
    limiter.check_and_record(USER, ActionKind::Swap).await?;
    clock.advance(minutes(1));
    limiter.check_and_record(USER, ActionKind::Swap).await?;

    let err = limiter
        .check_and_record(USER, ActionKind::Swap)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BotError::RateLimited {
            retry_after_minutes: 8
        }
    ));

    clock.advance(minutes(8));
    assert_eq!(
        limiter.check(USER, ActionKind::Swap).await?,
        RateDecision::Allowed
    );
    limiter.check_and_record(USER, ActionKind::Swap).await?;
    Ok(())
}

#[tokio::test]
async fn test_denied_attempt_is_not_recorded() -> Result<()> {
    let (limiter, clock) = limiter(RateLimitConfig {
        swap_windows: vec![WindowLimit::new(1, minutes(10))],
        ..Default::default()
    });

    limiter.check_and_record(USER, ActionKind::Swap).await?;
    clock.advance(minutes(5));
    assert!(limiter.check_and_record(USER, ActionKind::Swap).await.is_err());

    // Had the denial been recorded, the window would still be full here
    clock.advance(minutes(5));
    limiter.check_and_record(USER, ActionKind::Swap).await?;
    Ok(())
}

#[tokio::test]
async fn test_every_window_must_allow() -> Result<()> {
    let (limiter, clock) = limiter(RateLimitConfig::default());

    // 3 per 10 minutes, spaced out so only the hourly window fills
    for _ in 0..5 {
        limiter.check_and_record(USER, ActionKind::Swap).await?;
        clock.advance(minutes(11));
    }

    let decision = limiter.check(USER, ActionKind::Swap).await?;
    // Oldest entry is 55 minutes old, the hourly window frees up in 5
    assert_eq!(decision.retry_after_minutes(), 5);
    Ok(())
}

#[tokio::test]
async fn test_kinds_and_users_are_independent() -> Result<()> {
    let (limiter, _clock) = limiter(RateLimitConfig {
        swap_windows: vec![WindowLimit::new(1, minutes(10))],
        search_windows: vec![WindowLimit::new(1, minutes(1))],
        ..Default::default()
    });

    limiter.check_and_record(USER, ActionKind::Swap).await?;
    limiter.check_and_record(USER, ActionKind::Search).await?;
    limiter.check_and_record(USER + 1, ActionKind::Swap).await?;

    assert!(matches!(
        limiter.check(USER, ActionKind::Swap).await?,
        RateDecision::Denied { .. }
    ));
    assert!(matches!(
        limiter.check(USER, ActionKind::Search).await?,
        RateDecision::Denied { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_records_respect_limit() -> Result<()> {
    let (limiter, _clock) = limiter(RateLimitConfig {
        swap_windows: vec![WindowLimit::new(3, minutes(10))],
        ..Default::default()
    });
    let limiter = Arc::new(limiter);

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check_and_record(USER, ActionKind::Swap).await })
        })
        .collect();

    let mut allowed = 0;
    for attempt in attempts {
        if attempt.await?.is_ok() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 3);
    Ok(())
}
