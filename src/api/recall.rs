use crate::api::body_snippet;
use crate::logw;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Scrape-and-summarize API that turns a video URL into a summary document.
pub struct RecallClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl RecallClient {
    pub fn new(client: Client, base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    /// Raw summary document for `video_url`, or `None` when the service refused.
    pub async fn fetch(&self, video_url: &str) -> Result<Option<Value>> {
        let url = format!("{}/scraper/", self.base_url);
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .query(&[("url", video_url)])
            .timeout(self.timeout)
            .send()
            .await
            .context("Recall request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            logw(format!("Recall HTTP {} for {}", status.as_u16(), video_url));
            if !raw.is_empty() {
                logw(format!("Recall raw body: {}", body_snippet(&raw)));
            }
            return Ok(None);
        }

        let raw = resp.text().await.context("Recall response read failed")?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(doc) => Ok(Some(doc)),
            Err(err) => {
                logw(format!("Recall response is not JSON: {}", err));
                Ok(None)
            }
        }
    }
}
