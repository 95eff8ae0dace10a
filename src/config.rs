//! # Configuration Module
//!
//! This module defines configuration structures for the bot, including
//! session lifetimes, upload windows, polling limits, rate-limit windows
//! and recovery settings for the remote providers.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

// Constants for session handling
pub const SEARCH_SESSION_TTL_SECS: u64 = 10 * 60;
pub const SWAP_SESSION_TTL_SECS: u64 = 5 * 60;
pub const SWEEP_INTERVAL_SECS: u64 = 10 * 60;
pub const RESULTS_PER_PAGE: usize = 9;
pub const MAX_SEARCH_RESULTS: usize = 45;
pub const DEDUP_WINDOW_SECS: u64 = 60;

// Constants for uploads
pub const SAVE_FACE_WINDOW_SECS: u64 = 5 * 60;
pub const INLINE_UPLOAD_WINDOW_SECS: u64 = 2 * 60;
pub const MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit for face images

// Constants for remote job polling
pub const POLL_INTERVAL_SECS: u64 = 5;
pub const IMAGE_JOB_MAX_ATTEMPTS: u32 = 60;
pub const MEDIA_JOB_MAX_ATTEMPTS: u32 = 120;
pub const MAX_MEDIA_DURATION_SECS: u32 = 30;

// Constants for saved faces
pub const MAX_SAVED_FACES: usize = 3;
pub const MAX_FACE_NAME_LENGTH: usize = 32;

pub const DEFAULT_FACESWAP_BASE_URL: &str = "https://api.magichour.ai";
pub const DEFAULT_GIF_SEARCH_BASE_URL: &str = "https://tenor.googleapis.com";

/// Lifetimes and sizes for the in-memory session stores
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle timeout for paged search sessions
    pub search_ttl: Duration,
    /// Idle timeout for swap sessions (shorter, they block on a single action)
    pub swap_ttl: Duration,
    /// Interval between expiry sweeps
    pub sweep_interval: Duration,
    /// Number of results shown per search page
    pub page_size: usize,
    /// Maximum number of results fetched per search
    pub max_results: usize,
    /// How long an inbound message id is remembered for deduplication
    pub dedup_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            search_ttl: Duration::from_secs(SEARCH_SESSION_TTL_SECS),
            swap_ttl: Duration::from_secs(SWAP_SESSION_TTL_SECS),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            page_size: RESULTS_PER_PAGE,
            max_results: MAX_SEARCH_RESULTS,
            dedup_window: Duration::from_secs(DEDUP_WINDOW_SECS),
        }
    }
}

/// Upload collection windows and accepted face images
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Collection window for the explicit save-a-face flow
    pub save_window: Duration,
    /// Collection window for an upload requested from a swap prompt
    pub inline_window: Duration,
    /// Accepted MIME types for face images
    pub allowed_content_types: Vec<String>,
    /// Maximum accepted face image size in bytes
    pub max_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            save_window: Duration::from_secs(SAVE_FACE_WINDOW_SECS),
            inline_window: Duration::from_secs(INLINE_UPLOAD_WINDOW_SECS),
            allowed_content_types: vec![
                "image/png".to_string(),
                "image/jpeg".to_string(),
                "image/webp".to_string(),
            ],
            max_size: MAX_UPLOAD_SIZE,
        }
    }
}

/// Polling limits for remote face-swap jobs
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Delay between two status checks
    pub interval: Duration,
    /// Attempt ceiling for still image jobs
    pub image_max_attempts: u32,
    /// Attempt ceiling for GIF/video jobs
    pub media_max_attempts: u32,
    /// Longest clip submitted for media jobs
    pub max_media_duration_secs: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(POLL_INTERVAL_SECS),
            image_max_attempts: IMAGE_JOB_MAX_ATTEMPTS,
            media_max_attempts: MEDIA_JOB_MAX_ATTEMPTS,
            max_media_duration_secs: MAX_MEDIA_DURATION_SECS,
        }
    }
}

/// A single sliding window: at most `limit` actions per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub limit: usize,
    pub window: Duration,
}

impl WindowLimit {
    pub const fn new(limit: usize, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Rate limit windows per action kind
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Windows applied to face-swap submissions (every window must allow)
    pub swap_windows: Vec<WindowLimit>,
    /// Windows applied to GIF searches
    pub search_windows: Vec<WindowLimit>,
    /// Timestamps older than this are dropped on record
    pub retention: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            swap_windows: vec![
                WindowLimit::new(5, Duration::from_secs(60 * 60)),
                WindowLimit::new(3, Duration::from_secs(10 * 60)),
            ],
            search_windows: vec![WindowLimit::new(10, Duration::from_secs(60))],
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Recovery configuration for remote provider calls
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts for transient HTTP failures
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single HTTP request in seconds
    pub request_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 8000,
            request_timeout_secs: 60,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Limits on saved faces
#[derive(Debug, Clone)]
pub struct FaceConfig {
    pub max_saved: usize,
    pub max_name_length: usize,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            max_saved: MAX_SAVED_FACES,
            max_name_length: MAX_FACE_NAME_LENGTH,
        }
    }
}

/// Where choice prompts for chat-detected GIFs are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptDelivery {
    /// Reply in the chat the GIF was posted in
    #[default]
    Channel,
    /// Message the user privately, falling back to the origin chat
    Direct,
}

impl PromptDelivery {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "channel" => Some(Self::Channel),
            "direct" | "dm" => Some(Self::Direct),
            _ => None,
        }
    }
}

/// Tunables shared by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub sessions: SessionConfig,
    pub uploads: UploadConfig,
    pub polling: PollingConfig,
    pub faces: FaceConfig,
    pub prompt_delivery: PromptDelivery,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Top level configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub database_url: Option<String>,
    pub gif_search_api_key: String,
    pub gif_search_base_url: String,
    pub faceswap_api_key: String,
    pub faceswap_base_url: String,
    pub log_format: LogFormat,
    pub orchestrator: OrchestratorConfig,
    pub rate_limits: RateLimitConfig,
    pub recovery: RecoveryConfig,
}

impl BotConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let telegram_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let gif_search_api_key = env::var("TENOR_API_KEY").context("TENOR_API_KEY must be set")?;
        let faceswap_api_key =
            env::var("FACESWAP_API_KEY").context("FACESWAP_API_KEY must be set")?;

        let log_format = match env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let prompt_delivery = match env::var("PROMPT_DELIVERY") {
            Ok(value) => PromptDelivery::parse(&value)
                .with_context(|| format!("Invalid PROMPT_DELIVERY value: {value}"))?,
            Err(_) => PromptDelivery::default(),
        };

        Ok(Self {
            telegram_token,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            gif_search_api_key,
            gif_search_base_url: env::var("TENOR_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GIF_SEARCH_BASE_URL.to_string()),
            faceswap_api_key,
            faceswap_base_url: env::var("FACESWAP_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_FACESWAP_BASE_URL.to_string()),
            log_format,
            orchestrator: OrchestratorConfig {
                prompt_delivery,
                ..Default::default()
            },
            rate_limits: RateLimitConfig::default(),
            recovery: RecoveryConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_ttl_shorter_than_search_ttl() {
        let config = SessionConfig::default();
        assert!(config.swap_ttl < config.search_ttl);
        assert_eq!(config.page_size, 9);
    }

    #[test]
    fn test_polling_ceilings_bound_wait() {
        let config = PollingConfig::default();
        assert_eq!(config.interval * config.image_max_attempts, Duration::from_secs(300));
        assert_eq!(config.interval * config.media_max_attempts, Duration::from_secs(600));
    }

    #[test]
    fn test_prompt_delivery_parse() {
        assert_eq!(PromptDelivery::parse("channel"), Some(PromptDelivery::Channel));
        assert_eq!(PromptDelivery::parse(" DM "), Some(PromptDelivery::Direct));
        assert_eq!(PromptDelivery::parse("carrier pigeon"), None);
    }
}
