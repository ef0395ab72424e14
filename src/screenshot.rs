//! Screenshot capture via the screenshotone `take` API.

use crate::error::ApiError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://api.screenshotone.com/take";

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(60);

/// `POST /api/screenshot` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRequest {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScreenshotResponse {
    /// Captured page as a PNG data URL
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScreenshotConfig {
    /// Used when a request carries no key
    pub api_key: Option<String>,
    pub endpoint: String,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

pub struct ScreenshotClient {
    client: Client,
    endpoint: String,
}

impl ScreenshotClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(CAPTURE_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Screenshot(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Capture `url` and return it as a `data:image/png;base64,...` URL
    pub async fn capture(&self, url: &str, api_key: &str) -> Result<String, ApiError> {
        if url.trim().is_empty() {
            return Err(ApiError::InvalidRequest("Screenshot URL is empty".to_string()));
        }
        debug!(target_url = url, "Capturing screenshot");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("access_key", api_key),
                ("url", url),
                ("full_page", "true"),
                ("device_scale_factor", "1"),
                ("format", "png"),
                ("block_ads", "true"),
                ("block_cookie_banners", "true"),
                ("block_trackers", "true"),
                ("cache", "false"),
                ("viewport_width", "1280"),
                ("viewport_height", "832"),
            ])
            .send()
            .await
            .map_err(|e| {
                // reqwest errors can echo the query string, which carries the key
                let cause = if e.is_timeout() { "timed out" } else { "request failed" };
                ApiError::Screenshot(cause.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            warn!(status = status.as_u16(), "Screenshot service returned an error");
            return Err(ApiError::Screenshot(format!(
                "service returned {}: {}",
                status.as_u16(),
                excerpt
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|_| ApiError::Screenshot("failed to read image body".to_string()))?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(&bytes)))
    }
}
