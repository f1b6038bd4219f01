use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::compositor::ClipMode;
use crate::segmenter::{MarkerStyle, SegmentLimits};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "recall_api_secret")]
    #[serde(default)]
    pub recall_key: String,
    #[serde(rename = "open_api_key")]
    #[serde(default)]
    pub openai_key: String,
    #[serde(rename = "youtube_api_key")]
    #[serde(default)]
    pub youtube_key: String,
    #[serde(rename = "openai_model")]
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default)]
    pub segment: SegmentConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub upload: Option<UploadConfig>,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub endpoints: ServiceEndpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    #[serde(default = "default_char_limit")]
    pub char_limit: usize,
    #[serde(default = "default_upper_limit")]
    pub upper_limit: usize,
    #[serde(default = "default_true")]
    pub continuation_marker: bool,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            char_limit: default_char_limit(),
            upper_limit: default_upper_limit(),
            continuation_marker: true,
        }
    }
}

impl SegmentConfig {
    pub fn limits(&self) -> SegmentLimits {
        SegmentLimits {
            char_limit: self.char_limit,
            upper_limit: self.upper_limit,
        }
    }

    pub fn marker_style(&self) -> MarkerStyle {
        if self.continuation_marker {
            MarkerStyle::WithContinuation
        } else {
            MarkerStyle::PartOnly
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_tts_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_voices")]
    pub voices: Vec<String>,
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Silence between sentences, in seconds. Also the cue spacing.
    #[serde(default = "default_gap")]
    pub gap: f64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Longest sub-caption shown on screen; 0 keeps one caption per sentence.
    #[serde(default)]
    pub max_caption_chars: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoints: default_tts_endpoints(),
            voices: default_voices(),
            speed: default_speed(),
            gap: default_gap(),
            concurrency: default_concurrency(),
            max_caption_chars: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub clip_mode: ClipMode,
    #[serde(default = "default_backgrounds_dir")]
    pub backgrounds_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_bitrate")]
    pub video_bitrate: String,
    #[serde(default = "default_font")]
    pub font: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clip_mode: ClipMode::default(),
            backgrounds_dir: default_backgrounds_dir(),
            output_dir: default_output_dir(),
            work_dir: default_work_dir(),
            checkpoint_dir: default_checkpoint_dir(),
            fps: default_fps(),
            video_bitrate: default_bitrate(),
            font: default_font(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub upload: bool,
    #[serde(default)]
    pub dedup: bool,
    #[serde(default)]
    pub publish: bool,
    /// Skip fetching/enhancing and read the enhanced summary from `fixture_path`.
    #[serde(default)]
    pub test_fixture: bool,
    #[serde(default = "default_fixture_path")]
    pub fixture_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub put_base_url: String,
    pub public_base_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum DedupConfig {
    File {
        #[serde(default = "default_dedup_path")]
        path: PathBuf,
    },
    Rest {
        url: String,
        table: String,
        api_key: String,
    },
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig::File {
            path: default_dedup_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstagramConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    #[serde(default = "default_recall_secs")]
    pub recall_secs: u64,
    #[serde(default = "default_openai_secs")]
    pub openai_secs: u64,
    #[serde(default = "default_tts_secs")]
    pub tts_secs: u64,
    #[serde(default = "default_publish_secs")]
    pub publish_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            recall_secs: default_recall_secs(),
            openai_secs: default_openai_secs(),
            tts_secs: default_tts_secs(),
            publish_secs: default_publish_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_polls: default_max_polls(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_list")]
    pub list_path: PathBuf,
    #[serde(default = "default_hours_ago")]
    pub hours_ago: i64,
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u64,
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            list_path: default_monitor_list(),
            hours_ago: default_hours_ago(),
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
        }
    }
}

/// Base URLs of the remote services. Overridable so tests can point at a mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    #[serde(default = "default_recall_url")]
    pub recall: String,
    #[serde(default = "default_openai_url")]
    pub openai: String,
    #[serde(default = "default_graph_url")]
    pub instagram_graph: String,
    #[serde(default = "default_youtube_url")]
    pub youtube: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            recall: default_recall_url(),
            openai: default_openai_url(),
            instagram_graph: default_graph_url(),
            youtube: default_youtube_url(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_openai_model() -> String {
    "gpt-4".to_string()
}

fn default_char_limit() -> usize {
    1300
}

fn default_upper_limit() -> usize {
    2600
}

fn default_tts_endpoints() -> Vec<String> {
    vec![
        "https://tiktok-tts.weilnet.workers.dev/api/generation".to_string(),
        "https://tiktoktts.com/api/tiktok-tts".to_string(),
    ]
}

fn default_voices() -> Vec<String> {
    ["en_uk_001", "en_uk_003", "en_us_007", "en_us_009"]
        .iter()
        .map(|v| v.to_string())
        .collect()
}

fn default_speed() -> f64 {
    1.15
}

fn default_gap() -> f64 {
    0.1
}

fn default_concurrency() -> usize {
    4
}

fn default_backgrounds_dir() -> PathBuf {
    PathBuf::from("inputs")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("operation_data")
}

fn default_fps() -> u32 {
    30
}

fn default_bitrate() -> String {
    "4000k".to_string()
}

fn default_font() -> String {
    "Arial-Bold".to_string()
}

fn default_fixture_path() -> PathBuf {
    PathBuf::from("enhanced_summary.json")
}

fn default_dedup_path() -> PathBuf {
    PathBuf::from("operation_data/processed_videos.json")
}

fn default_connect_secs() -> u64 {
    30
}

fn default_recall_secs() -> u64 {
    120
}

fn default_openai_secs() -> u64 {
    300
}

fn default_tts_secs() -> u64 {
    60
}

fn default_publish_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_polls() -> u32 {
    120
}

fn default_monitor_list() -> PathBuf {
    PathBuf::from("monitor/monitor_list.txt")
}

fn default_hours_ago() -> i64 {
    48
}

fn default_min_duration() -> u64 {
    600
}

fn default_max_duration() -> u64 {
    18_000
}

fn default_recall_url() -> String {
    "https://apollo.getrecall.ai".to_string()
}

fn default_openai_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_graph_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_youtube_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// Parses the file without validating it, for callers that override
    /// fields before calling [`Config::validate`].
    pub async fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.segment.char_limit >= self.segment.upper_limit {
            anyhow::bail!(
                "config.json: segment.char_limit ({}) must be below segment.upper_limit ({})",
                self.segment.char_limit,
                self.segment.upper_limit
            );
        }
        if !(self.speech.speed > 0.0) {
            anyhow::bail!("config.json: speech.speed must be positive");
        }
        if self.speech.gap < 0.0 {
            anyhow::bail!("config.json: speech.gap must not be negative");
        }
        if self.speech.endpoints.is_empty() {
            anyhow::bail!("config.json: speech.endpoints is empty");
        }
        if self.speech.voices.is_empty() {
            anyhow::bail!("config.json: speech.voices is empty");
        }
        if !self.features.test_fixture {
            if self.recall_key.is_empty() {
                anyhow::bail!("config.json: recall_api_secret missing");
            }
            if self.openai_key.is_empty() {
                anyhow::bail!("config.json: open_api_key missing");
            }
        }
        if self.features.publish
            && (self.instagram.access_token.is_empty() || self.instagram.account_id.is_empty())
        {
            anyhow::bail!("config.json: instagram.access_token / instagram.account_id missing");
        }
        if self.features.publish && !self.features.upload {
            anyhow::bail!("config.json: features.publish needs features.upload for a public video URL");
        }
        if self.features.upload && self.upload.is_none() {
            anyhow::bail!("config.json: features.upload is on but the upload section is missing");
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = Config::from_json(r#"{"recall_api_secret":"r","open_api_key":"o"}"#).unwrap();
        assert_eq!(cfg.segment.char_limit, 1300);
        assert_eq!(cfg.segment.upper_limit, 2600);
        assert!((cfg.speech.gap - 0.1).abs() < f64::EPSILON);
        assert_eq!(cfg.speech.endpoints.len(), 2);
        assert_eq!(cfg.timeouts.poll_interval(), Duration::from_secs(5));
        assert!(matches!(cfg.dedup, DedupConfig::File { .. }));
        assert_eq!(cfg.segment.marker_style(), MarkerStyle::WithContinuation);
    }

    #[test]
    fn missing_keys_rejected_unless_fixture_mode() {
        assert!(Config::from_json("{}").is_err());
        let cfg = Config::from_json(r#"{"features":{"test_fixture":true}}"#).unwrap();
        assert!(cfg.features.test_fixture);
        assert_eq!(cfg.features.fixture_path, PathBuf::from("enhanced_summary.json"));
    }

    #[test]
    fn limits_must_be_ordered() {
        let err = Config::from_json(
            r#"{"features":{"test_fixture":true},"segment":{"char_limit":500,"upper_limit":500}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("char_limit"));
    }

    #[test]
    fn rest_dedup_backend_parses() {
        let cfg = Config::from_json(
            r#"{"features":{"test_fixture":true},
                "dedup":{"backend":"rest","url":"https://db.example","table":"videos","api_key":"k"}}"#,
        )
        .unwrap();
        match cfg.dedup {
            DedupConfig::Rest { table, .. } => assert_eq!(table, "videos"),
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn publish_requires_credentials() {
        let err = Config::from_json(r#"{"features":{"test_fixture":true,"publish":true}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("instagram"));

        let err = Config::from_json(
            r#"{"features":{"test_fixture":true,"publish":true},
                "instagram":{"access_token":"t","account_id":"a"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("features.upload"));
    }
}
