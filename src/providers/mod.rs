//! Remote providers
//!
//! The orchestrator depends on these contracts only:
//! - `face_swap`: staged assets, job submission and status polling
//! - `gif_search`: paged GIF search
//! - `retry`: jittered backoff shared by the HTTP clients

pub mod face_swap;
pub mod gif_search;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BotResult;
use crate::model::MediaKind;
use crate::session::GifResult;

pub use face_swap::HttpFaceSwapClient;
pub use gif_search::TenorClient;

/// Which status endpoint a job lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Image,
    Media,
}

/// Identifier of a submitted remote job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    pub kind: JobKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Complete,
    Error,
}

/// Status reported by the provider for a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub result_url: Option<String>,
    pub credits_charged: Option<i64>,
    pub error_message: Option<String>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            state: JobState::Pending,
            result_url: None,
            credits_charged: None,
            error_message: None,
        }
    }

    pub fn complete(result_url: impl Into<String>, credits_charged: Option<i64>) -> Self {
        Self {
            state: JobState::Complete,
            result_url: Some(result_url.into()),
            credits_charged,
            error_message: None,
        }
    }

    pub fn error(message: Option<String>) -> Self {
        Self {
            state: JobState::Error,
            result_url: None,
            credits_charged: None,
            error_message: message,
        }
    }
}

/// Face-swap job provider
#[async_trait]
pub trait FaceSwapProvider: Send + Sync {
    /// Upload bytes so a job can reference them; returns the asset locator
    async fn stage_asset(&self, bytes: Vec<u8>, kind: MediaKind) -> BotResult<String>;
    async fn submit_image_job(&self, source: &str, target: &str) -> BotResult<JobHandle>;
    async fn submit_media_job(
        &self,
        source: &str,
        target: &str,
        max_duration_secs: u32,
    ) -> BotResult<JobHandle>;
    async fn get_job_status(&self, job: &JobHandle) -> BotResult<JobStatus>;
    /// Download a finished result
    async fn fetch_result(&self, url: &str) -> BotResult<Vec<u8>>;
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GifSearchPage {
    pub results: Vec<GifResult>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait GifSearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> BotResult<GifSearchPage>;
}
