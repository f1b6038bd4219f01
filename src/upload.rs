use crate::config::UploadConfig;
use crate::{logok, logw};
use anyhow::{Context, Result};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

/// Object key for a rendered part: `{slug}/part_{n}.mp4`.
pub fn object_key(slug: &str, part_number: usize) -> String {
    format!("{}/part_{}.mp4", slug, part_number)
}

/// Puts rendered reels somewhere the publisher can fetch them by URL.
pub struct Uploader {
    client: Client,
    put_base_url: String,
    public_base_url: String,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl Uploader {
    pub fn new(client: Client, cfg: &UploadConfig, timeout: Duration) -> Self {
        Self {
            client,
            put_base_url: cfg.put_base_url.trim_end_matches('/').to_string(),
            public_base_url: cfg.public_base_url.trim_end_matches('/').to_string(),
            bearer_token: cfg.bearer_token.clone().filter(|t| !t.is_empty()),
            timeout,
        }
    }

    /// Uploads `file` under `key` and returns its public URL.
    pub async fn upload(&self, file: &Path, key: &str) -> Result<Option<String>> {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let mut req = self
            .client
            .put(format!("{}/{}", self.put_base_url, key))
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .timeout(self.timeout)
            .body(bytes);
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("Upload request failed")?;
        if !resp.status().is_success() {
            logw(format!("Upload of {} failed: HTTP {}", key, resp.status().as_u16()));
            return Ok(None);
        }

        let public = format!("{}/{}", self.public_base_url, key);
        logok(format!("Uploaded {} -> {}", file.display(), public));
        Ok(Some(public))
    }
}
