use crate::api::body_snippet;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub fn reel_caption(part_number: usize, title: &str, caption: &str) -> String {
    format!("Part {}: \"{}\" summary\n\n{}", part_number, title, caption)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerStatus {
    Finished,
    Failed,
    Pending,
}

fn container_status(body: &Value) -> ContainerStatus {
    match body.get("status_code").and_then(Value::as_str) {
        Some("FINISHED") => ContainerStatus::Finished,
        Some("ERROR") | Some("EXPIRED") => ContainerStatus::Failed,
        _ => ContainerStatus::Pending,
    }
}

/// Publishes reels through the Graph API: container, status poll, publish.
pub struct InstagramPublisher {
    client: Client,
    graph_url: String,
    access_token: String,
    account_id: String,
    timeout: Duration,
    poll_interval: Duration,
    max_polls: u32,
}

impl InstagramPublisher {
    pub fn new(
        client: Client,
        graph_url: &str,
        access_token: &str,
        account_id: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            graph_url: graph_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            account_id: account_id.to_string(),
            timeout,
            poll_interval: Duration::from_secs(5),
            max_polls: 120,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    async fn post_json(&self, url: &str, params: &[(&str, &str)]) -> Result<(reqwest::StatusCode, Value)> {
        let resp = self
            .client
            .post(url)
            .query(params)
            .timeout(self.timeout)
            .send()
            .await
            .context("Graph API request failed")?;
        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&raw).unwrap_or(Value::Null);
        if !status.is_success() || body.is_null() {
            logw(format!("Graph API HTTP {}: {}", status.as_u16(), body_snippet(&raw)));
        }
        Ok((status, body))
    }

    async fn create_container(&self, video_url: &str, caption: &str) -> Result<Option<String>> {
        let url = format!("{}/{}/media", self.graph_url, self.account_id);
        let (_, body) = self
            .post_json(
                &url,
                &[
                    ("access_token", self.access_token.as_str()),
                    ("caption", caption),
                    ("media_type", "REELS"),
                    ("share_to_feed", "true"),
                    ("video_url", video_url),
                ],
            )
            .await?;
        Ok(body.get("id").and_then(Value::as_str).map(str::to_string))
    }

    async fn wait_for_container(&self, container_id: &str) -> Result<bool> {
        let url = format!("{}/{}", self.graph_url, container_id);
        for attempt in 1..=self.max_polls {
            let resp = self
                .client
                .get(&url)
                .query(&[
                    ("access_token", self.access_token.as_str()),
                    ("fields", "status_code"),
                ])
                .timeout(self.timeout)
                .send()
                .await
                .context("Graph API status request failed")?;
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);

            match container_status(&body) {
                ContainerStatus::Finished => {
                    logok(format!("Container {} finished", container_id));
                    return Ok(true);
                }
                ContainerStatus::Failed => {
                    logw(format!("Container {} failed: {}", container_id, body));
                    return Ok(false);
                }
                ContainerStatus::Pending => {
                    logi(format!("Container {} in progress ({}/{})", container_id, attempt, self.max_polls));
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        logw(format!("Container {} still pending after {} polls", container_id, self.max_polls));
        Ok(false)
    }

    async fn publish_container(&self, container_id: &str) -> Result<Option<String>> {
        let url = format!("{}/{}/media_publish", self.graph_url, self.account_id);
        let (_, body) = self
            .post_json(
                &url,
                &[
                    ("access_token", self.access_token.as_str()),
                    ("creation_id", container_id),
                ],
            )
            .await?;
        Ok(body.get("id").and_then(Value::as_str).map(str::to_string))
    }

    /// Returns `Ok(true)` once the reel is live.
    pub async fn publish(&self, video_url: &str, caption: &str) -> Result<bool> {
        let Some(container_id) = self.create_container(video_url, caption).await? else {
            logw("Error creating reel container".to_string());
            return Ok(false);
        };
        logi(format!("Container created with ID: {}", container_id));

        if !self.wait_for_container(&container_id).await? {
            return Ok(false);
        }

        match self.publish_container(&container_id).await? {
            Some(media_id) => {
                logok(format!("Reel published with ID: {}", media_id));
                Ok(true)
            }
            None => {
                logw(format!("Error publishing container {}", container_id));
                Ok(false)
            }
        }
    }
}
