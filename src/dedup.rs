use crate::api::body_snippet;
use crate::config::DedupConfig;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Remembers which source videos were already turned into reels.
/// Read once before a video is processed and written once after it succeeded.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn exists(&self, video_url: &str) -> Result<bool>;
    async fn record(&self, video_url: &str, metadata: &Value) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedVideo {
    pub video_url: String,
    pub recorded_at: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Append-only JSON array on local disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Result<Vec<ProcessedVideo>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).with_context(|| format!("Invalid dedup file {}", self.path.display()))
    }
}

#[async_trait]
impl DedupStore for JsonFileStore {
    async fn exists(&self, video_url: &str) -> Result<bool> {
        Ok(self.read_all().await?.iter().any(|r| r.video_url == video_url))
    }

    async fn record(&self, video_url: &str, metadata: &Value) -> Result<()> {
        let mut rows = self.read_all().await?;
        rows.push(ProcessedVideo {
            video_url: video_url.to_string(),
            recorded_at: Utc::now().to_rfc3339(),
            metadata: metadata.clone(),
        });
        crate::summary::save_json(&self.path, &rows).await
    }
}

/// Row store behind a PostgREST-style HTTP API.
pub struct RestTableStore {
    client: Client,
    table_url: String,
    api_key: String,
    timeout: Duration,
}

impl RestTableStore {
    pub fn new(client: Client, base_url: &str, table: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            client,
            table_url: format!("{}/{}", base_url.trim_end_matches('/'), table),
            api_key: api_key.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl DedupStore for RestTableStore {
    async fn exists(&self, video_url: &str) -> Result<bool> {
        let filter = format!("eq.{}", video_url);
        let resp = self
            .client
            .get(&self.table_url)
            .query(&[("video_url", filter.as_str()), ("select", "video_url")])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .context("Dedup lookup failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Dedup lookup HTTP {}: {}", status.as_u16(), body_snippet(&raw));
        }
        let rows: Vec<Value> = serde_json::from_str(&raw).context("Dedup lookup returned non-array")?;
        Ok(!rows.is_empty())
    }

    async fn record(&self, video_url: &str, metadata: &Value) -> Result<()> {
        let resp = self
            .client
            .post(&self.table_url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(&json!({ "video_url": video_url, "metadata": metadata }))
            .timeout(self.timeout)
            .send()
            .await
            .context("Dedup insert failed")?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            logw(format!("Dedup insert HTTP {}: {}", status.as_u16(), body_snippet(&raw)));
            anyhow::bail!("Dedup insert rejected with HTTP {}", status.as_u16());
        }
        Ok(())
    }
}

pub fn open_store(cfg: &DedupConfig, client: Client, timeout: Duration) -> Box<dyn DedupStore> {
    match cfg {
        DedupConfig::File { path } => Box::new(JsonFileStore::new(path.clone())),
        DedupConfig::Rest { url, table, api_key } => {
            Box::new(RestTableStore::new(client, url, table, api_key, timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn file_store_records_and_finds_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("data/processed.json"));

        assert!(!store.exists("https://y/1").await.unwrap());
        store.record("https://y/1", &json!({"parts": 2})).await.unwrap();
        store.record("https://y/2", &Value::Null).await.unwrap();

        assert!(store.exists("https://y/1").await.unwrap());
        assert!(store.exists("https://y/2").await.unwrap());
        assert!(!store.exists("https://y/3").await.unwrap());

        let rows = store.read_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].metadata["parts"], 2);
    }

    #[tokio::test]
    async fn rest_store_queries_by_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/processed_videos"))
            .and(query_param("video_url", "eq.https://y/1"))
            .and(query_param("select", "video_url"))
            .and(header("apikey", "key"))
            .and(header("authorization", "Bearer key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"video_url": "https://y/1"}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/processed_videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = RestTableStore::new(Client::new(), &server.uri(), "processed_videos", "key", Duration::from_secs(5));
        assert!(store.exists("https://y/1").await.unwrap());
        assert!(!store.exists("https://y/2").await.unwrap());
    }

    #[tokio::test]
    async fn rest_store_posts_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/processed_videos"))
            .and(body_json(json!({"video_url": "https://y/1", "metadata": {"title": "T"}})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = RestTableStore::new(Client::new(), &server.uri(), "processed_videos", "key", Duration::from_secs(5));
        store.record("https://y/1", &json!({"title": "T"})).await.unwrap();
    }

    #[tokio::test]
    async fn rest_store_surfaces_lookup_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = RestTableStore::new(Client::new(), &server.uri(), "t", "key", Duration::from_secs(5));
        assert!(store.exists("u").await.is_err());
    }
}
