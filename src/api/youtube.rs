use crate::api::body_snippet;
use crate::{logi, logw};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoCandidate {
    pub id: String,
    pub title: String,
    pub views: u64,
    pub duration_secs: u64,
}

impl VideoCandidate {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}

/// Seconds in an ISO-8601 duration such as `PT1H2M3S` or `P1DT5M`.
pub fn parse_iso8601_duration(text: &str) -> Option<u64> {
    let rest = text.trim().strip_prefix('P')?;
    let mut total = 0u64;
    let mut number = String::new();
    let mut in_time = false;
    let mut seen_unit = false;

    for ch in rest.chars() {
        match ch {
            '0'..='9' => number.push(ch),
            'T' if number.is_empty() => in_time = true,
            unit => {
                let n: u64 = number.parse().ok()?;
                number.clear();
                let factor = match (unit, in_time) {
                    ('W', false) => 7 * 86_400,
                    ('D', false) => 86_400,
                    ('H', true) => 3600,
                    ('M', true) => 60,
                    ('S', true) => 1,
                    _ => return None,
                };
                total += n * factor;
                seen_unit = true;
            }
        }
    }

    if !number.is_empty() || !seen_unit {
        return None;
    }
    Some(total)
}

/// Channel names from a monitor list: one per line, `Channel: ` prefix
/// optional, anything after the first comma ignored.
pub fn parse_monitor_list(text: &str) -> Vec<String> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            let head = l.split(',').next().unwrap_or_default();
            head.replace("Channel: ", "").trim().to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

pub async fn read_monitor_list(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read monitor list {}", path.display()))?;
    Ok(parse_monitor_list(&text))
}

pub fn pick_most_viewed(videos: &[VideoCandidate]) -> Option<&VideoCandidate> {
    videos.iter().max_by_key(|v| v.views)
}

pub struct YouTubeClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl YouTubeClient {
    pub fn new(client: Client, base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Option<Value>> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self
            .client
            .get(url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .context("YouTube request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            logw(format!("YouTube HTTP {} on {}: {}", status.as_u16(), endpoint, body_snippet(&raw)));
            return Ok(None);
        }
        Ok(serde_json::from_str(&raw).ok())
    }

    pub async fn channel_id(&self, channel_name: &str) -> Result<Option<String>> {
        let body = self
            .get(
                "search",
                &[("q", channel_name), ("type", "channel"), ("part", "id"), ("maxResults", "1")],
            )
            .await?;
        Ok(body
            .as_ref()
            .and_then(|b| b.pointer("/items/0/id/channelId"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Videos from `channel_id` published after `since` whose length is
    /// within `[min_secs, max_secs]`.
    pub async fn recent_videos(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
        min_secs: u64,
        max_secs: u64,
    ) -> Result<Vec<VideoCandidate>> {
        let published_after = since.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let Some(search) = self
            .get(
                "search",
                &[
                    ("channelId", channel_id),
                    ("type", "video"),
                    ("order", "date"),
                    ("part", "id,snippet"),
                    ("maxResults", "50"),
                    ("publishedAfter", published_after.as_str()),
                ],
            )
            .await?
        else {
            return Ok(Vec::new());
        };

        let items = search.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
        let titled: Vec<(String, String)> = items
            .iter()
            .filter_map(|item| {
                let id = item.pointer("/id/videoId")?.as_str()?.to_string();
                let title = item
                    .pointer("/snippet/title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some((id, title))
            })
            .collect();
        if titled.is_empty() {
            return Ok(Vec::new());
        }

        let ids = titled.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>().join(",");
        let Some(details) = self
            .get("videos", &[("part", "contentDetails,statistics"), ("id", ids.as_str())])
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for video in details.get("items").and_then(Value::as_array).into_iter().flatten() {
            let Some(id) = video.get("id").and_then(Value::as_str) else {
                continue;
            };
            let duration = video
                .pointer("/contentDetails/duration")
                .and_then(Value::as_str)
                .and_then(parse_iso8601_duration);
            let views = video
                .pointer("/statistics/viewCount")
                .and_then(Value::as_str)
                .and_then(|v| v.parse::<u64>().ok());
            let (Some(duration_secs), Some(views)) = (duration, views) else {
                logw(format!("Skipping video {} with incomplete details", id));
                continue;
            };
            if duration_secs < min_secs || duration_secs > max_secs {
                continue;
            }
            let title = titled
                .iter()
                .find(|(vid, _)| vid == id)
                .map(|(_, t)| t.clone())
                .unwrap_or_default();
            out.push(VideoCandidate {
                id: id.to_string(),
                title,
                views,
                duration_secs,
            });
        }
        Ok(out)
    }

    /// Most-viewed qualifying video across `channels` in the last `hours_ago` hours.
    pub async fn find_best_video(
        &self,
        channels: &[String],
        hours_ago: i64,
        min_secs: u64,
        max_secs: u64,
    ) -> Result<Option<VideoCandidate>> {
        let since = Utc::now() - chrono::Duration::hours(hours_ago);
        let mut all = Vec::new();
        for name in channels {
            match self.channel_id(name).await? {
                Some(id) => {
                    logi(format!("Channel: {}, ID: {}", name, id));
                    all.extend(self.recent_videos(&id, since, min_secs, max_secs).await?);
                }
                None => logw(format!("Could not find channel ID for: {}", name)),
            }
        }
        Ok(pick_most_viewed(&all).cloned())
    }
}
