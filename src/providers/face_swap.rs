//! HTTP client for the face-swap job API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::retry::{HttpFailure, RetryPolicy};
use super::{FaceSwapProvider, JobHandle, JobKind, JobStatus};
use crate::config::RecoveryConfig;
use crate::errors::{BotError, BotResult};
use crate::media::detect_media_format;
use crate::model::MediaKind;

#[derive(Debug, Serialize)]
struct UploadUrlItem<'a> {
    #[serde(rename = "type")]
    asset_type: &'a str,
    extension: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadUrlsResponse {
    items: Vec<UploadUrl>,
}

#[derive(Debug, Deserialize)]
struct UploadUrl {
    upload_url: String,
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct CreatedJob {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProjectStatus {
    status: String,
    #[serde(default)]
    downloads: Vec<Download>,
    credits_charged: Option<i64>,
    error: Option<ProjectError>,
}

#[derive(Debug, Deserialize)]
struct Download {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ProjectError {
    message: Option<String>,
}

impl ProjectStatus {
    fn into_job_status(self) -> JobStatus {
        match self.status.as_str() {
            "complete" => match self.downloads.into_iter().next() {
                Some(download) => JobStatus::complete(download.url, self.credits_charged),
                None => JobStatus::error(Some("job completed without output".to_string())),
            },
            "error" | "canceled" => JobStatus::error(self.error.and_then(|e| e.message)),
            _ => JobStatus::pending(),
        }
    }
}

/// Face-swap provider speaking the project-based job API
pub struct HttpFaceSwapClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpFaceSwapClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        recovery: &RecoveryConfig,
    ) -> BotResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(recovery.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            retry: RetryPolicy::from(recovery),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, HttpFailure> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpFailure::from_status(status, &text));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl FaceSwapProvider for HttpFaceSwapClient {
    async fn stage_asset(&self, bytes: Vec<u8>, kind: MediaKind) -> BotResult<String> {
        let extension = detect_media_format(&bytes).extension();
        let asset_type = if kind.is_animated() { "video" } else { "image" };
        let body = &json!({ "items": [UploadUrlItem { asset_type, extension }] });

        let upload: UploadUrlsResponse = self
            .retry
            .run("upload-urls", move || self.post_json("/v1/files/upload-urls", body))
            .await?;
        let target = upload
            .items
            .into_iter()
            .next()
            .ok_or_else(|| BotError::Provider("no upload url returned".to_string()))?;

        let size = bytes.len();
        self.retry
            .run("upload", || {
                let request = self.client.put(&target.upload_url).body(bytes.clone());
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    if status.is_success() {
                        Ok(())
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        Err(HttpFailure::from_status(status, &text))
                    }
                }
            })
            .await?;

        debug!(file_path = %target.file_path, size, "Asset staged");
        Ok(target.file_path)
    }

    async fn submit_image_job(&self, source: &str, target: &str) -> BotResult<JobHandle> {
        let body = &json!({
            "name": "faceswap-bot image",
            "assets": { "source_file_path": source, "target_file_path": target },
        });
        let created: CreatedJob = self
            .retry
            .run("face-swap-photo", move || self.post_json("/v1/face-swap-photo", body))
            .await?;
        info!(job_id = %created.id, "Image face-swap job submitted");
        Ok(JobHandle {
            id: created.id,
            kind: JobKind::Image,
        })
    }

    async fn submit_media_job(
        &self,
        source: &str,
        target: &str,
        max_duration_secs: u32,
    ) -> BotResult<JobHandle> {
        let body = &json!({
            "name": "faceswap-bot media",
            "start_seconds": 0,
            "end_seconds": max_duration_secs,
            "assets": {
                "image_file_path": source,
                "video_file_path": target,
                "video_source": "file",
            },
        });
        let created: CreatedJob = self
            .retry
            .run("face-swap", move || self.post_json("/v1/face-swap", body))
            .await?;
        info!(job_id = %created.id, "Media face-swap job submitted");
        Ok(JobHandle {
            id: created.id,
            kind: JobKind::Media,
        })
    }

    async fn get_job_status(&self, job: &JobHandle) -> BotResult<JobStatus> {
        let path = match job.kind {
            JobKind::Image => format!("/v1/image-projects/{}", job.id),
            JobKind::Media => format!("/v1/video-projects/{}", job.id),
        };
        let response = self
            .client
            .get(self.url(&path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpFailure::from_status(status, &text).error);
        }
        let project: ProjectStatus = response.json().await?;
        Ok(project.into_job_status())
    }

    async fn fetch_result(&self, url: &str) -> BotResult<Vec<u8>> {
        let bytes = self
            .retry
            .run("fetch-result", move || async move {
                let response = self.client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(HttpFailure::from_status(status, ""));
                }
                Ok(response.bytes().await?)
            })
            .await?;
        Ok(bytes.to_vec())
    }
}
