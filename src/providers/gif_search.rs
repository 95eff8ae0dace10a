use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::retry::{HttpFailure, RetryPolicy};
use super::{GifSearchPage, GifSearchProvider};
use crate::config::RecoveryConfig;
use crate::errors::BotResult;
use crate::session::GifResult;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TenorResult>,
    #[serde(default)]
    next: String,
}

#[derive(Debug, Deserialize)]
struct TenorResult {
    id: String,
    #[serde(default)]
    content_description: String,
    #[serde(default)]
    media_formats: HashMap<String, TenorMedia>,
}

#[derive(Debug, Deserialize)]
struct TenorMedia {
    url: String,
}

impl SearchResponse {
    fn into_page(self) -> GifSearchPage {
        let results = self
            .results
            .into_iter()
            .filter_map(|result| {
                let url = result.media_formats.get("gif")?.url.clone();
                let preview_url = result
                    .media_formats
                    .get("tinygif")
                    .map(|m| m.url.clone())
                    .unwrap_or_else(|| url.clone());
                Some(GifResult {
                    id: result.id,
                    title: result.content_description,
                    url,
                    preview_url,
                })
            })
            .collect();
        // Tenor returns "0" or "" once the result set is exhausted
        let next_cursor = match self.next.as_str() {
            "" | "0" => None,
            _ => Some(self.next),
        };
        GifSearchPage {
            results,
            next_cursor,
        }
    }
}

/// Tenor v2 search client
pub struct TenorClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl TenorClient {
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
}

#[async_trait]
impl GifSearchProvider for TenorClient {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> BotResult<GifSearchPage> {
        let url = format!("{}/v2/search", self.base_url);
        let limit = limit.to_string();
        let mut params = vec![
            ("q", query),
            ("key", self.api_key.as_str()),
            ("limit", limit.as_str()),
            ("media_filter", "gif,tinygif"),
        ];
        if let Some(pos) = cursor {
            params.push(("pos", pos));
        }
        let (url, params) = (&url, &params);

        let response: SearchResponse = self
            .retry
            .run("gif-search", move || async move {
                let response = self.client.get(url).query(params).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(HttpFailure::from_status(status, &text));
                }
                Ok(response.json::<SearchResponse>().await?)
            })
            .await?;

        let page = response.into_page();
        debug!(query = %query, results = page.results.len(), "GIF search completed");
        Ok(page)
    }
}
