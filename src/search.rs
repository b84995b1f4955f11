//! Web and image search over a Serper-compatible API.

use crate::config::SearchConfig;
use crate::error::PipelineError;
use crate::fanout::ImageFinder;
use crate::outline::Outline;
use crate::provider::{build_http_client, map_http_error, map_status};
use crate::types::ImageReference;
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// One organic search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Web search capability
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>, PipelineError>;
}

#[derive(Deserialize)]
struct OrganicResponse {
    #[serde(default)]
    organic: Vec<WebResult>,
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    images: Vec<ImageHit>,
}

#[derive(Deserialize)]
struct ImageHit {
    #[serde(rename = "imageUrl")]
    image_url: String,
    #[serde(default)]
    title: Option<String>,
}

/// Serper-compatible search client
pub struct SerperClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    results: usize,
}

impl SerperClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        results: usize,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            results: results.max(1),
        })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, PipelineError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::new(config.base_url.clone(), api_key, config.results)
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, PipelineError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            PipelineError::Provider("search API key is not configured".to_string())
        })?;
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &text));
        }
        response
            .json()
            .await
            .map_err(|e| PipelineError::Provider(format!("Failed to parse search response: {}", e)))
    }

    async fn first_image(&self, title: &str) -> Result<Option<ImageReference>, PipelineError> {
        let found: ImagesResponse = self.post("images", json!({ "q": title, "num": 1 })).await?;
        Ok(found.images.into_iter().next().map(|hit| ImageReference {
            submodule_title: Some(title.to_string()),
            url: hit.image_url,
            caption: hit.title,
        }))
    }
}

#[async_trait]
impl WebSearch for SerperClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>, PipelineError> {
        let num = if limit == 0 { self.results } else { limit };
        let response: OrganicResponse = self.post("search", json!({ "q": query, "num": num })).await?;
        debug!(query, results = response.organic.len(), "Web search completed");
        Ok(response.organic.into_iter().take(num).collect())
    }
}

#[async_trait]
impl ImageFinder for SerperClient {
    /// One lookup per submodule title; results keep outline order.
    async fn find_images_for_outline(
        &self,
        outline: &Outline,
    ) -> Result<Vec<ImageReference>, PipelineError> {
        let lookups = outline.titles().map(|title| self.first_image(title));
        let found: Vec<ImageReference> = try_join_all(lookups).await?.into_iter().flatten().collect();
        info!(submodules = outline.len(), images = found.len(), "Image lookup completed");
        Ok(found)
    }
}

/// Render results as a numbered context block for prompts.
pub fn format_results(results: &[WebResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {} ({})\n{}", i + 1, r.title, r.link, r.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}
