use crate::api::instagram::{self, InstagramPublisher};
use crate::api::openai::OpenAiClient;
use crate::api::recall::RecallClient;
use crate::api::tiktok_tts::{SynthesisSession, TikTokTts};
use crate::api::youtube::{self, YouTubeClient};
use crate::api::build_client;
use crate::compositor::{Compositor, ReelComposer};
use crate::config::Config;
use crate::dedup::{self, DedupStore};
use crate::ffmpeg::FfmpegToolkit;
use crate::segmenter::{self, Part};
use crate::summary::{self, EnhancedSummary, PartScript, StructuredSummary};
use crate::timeline::{AudioToolkit, SpeechSynthesizer, TimelineBuilder};
use crate::upload::{self, Uploader};
use crate::workspace::PartWorkspace;
use crate::{loge, logi, logok, logw};
use anyhow::{Context, Result};
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use walkdir::WalkDir;

/// Source label used when the script comes from the fixture file.
pub const FIXTURE_SOURCE: &str = "fixture";
const UNTITLED: &str = "Untitled Video";

/// Result of one unit of work: a part or a whole video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Success,
    Skipped(String),
    Failed(String),
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Success)
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOutcome::Success => write!(f, "success"),
            UnitOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            UnitOutcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoReport {
    pub video_url: String,
    pub outcome: UnitOutcome,
    pub parts: Vec<(usize, UnitOutcome)>,
}

impl VideoReport {
    fn new(video_url: &str, outcome: UnitOutcome) -> Self {
        Self {
            video_url: video_url.to_string(),
            outcome,
            parts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub videos: Vec<VideoReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.videos.iter().filter(|v| v.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.videos
            .iter()
            .filter(|v| matches!(v.outcome, UnitOutcome::Failed(_)))
            .count()
    }

    pub fn parts_rendered(&self) -> usize {
        self.videos
            .iter()
            .flat_map(|v| v.parts.iter())
            .filter(|(_, o)| o.is_success())
            .count()
    }
}

/// Lowercase, dash-separated form of a title, safe for file and object names.
pub fn title_slug(title: &str) -> String {
    let mut out = String::new();
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("video");
    }
    out
}

async fn clear_directory_contents(dir_path: &Path) -> Result<()> {
    if !dir_path.is_dir() {
        return Ok(());
    }

    for entry in WalkDir::new(dir_path).min_depth(1).contents_first(true) {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir(path).await.ok();
        } else {
            fs::remove_file(path).await.ok();
        }
    }
    Ok(())
}

/// Script and display metadata for one source video.
#[derive(Debug, Clone)]
struct SourceScript {
    title: String,
    enhanced: EnhancedSummary,
}

/// One configured pipeline. Feature flags decide which optional stages run.
pub struct Pipeline<'a> {
    cfg: &'a Config,
    client: reqwest::Client,
    speech: Box<dyn SpeechSynthesizer>,
    audio: Box<dyn AudioToolkit>,
    composer: Box<dyn ReelComposer>,
    dedup: Option<Box<dyn DedupStore>>,
    uploader: Option<Uploader>,
    publisher: Option<InstagramPublisher>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cfg: &'a Config,
        client: reqwest::Client,
        speech: Box<dyn SpeechSynthesizer>,
        audio: Box<dyn AudioToolkit>,
    ) -> Self {
        let composer = Compositor::new(client.clone(), &cfg.render);
        Self {
            cfg,
            client,
            speech,
            audio,
            composer: Box::new(composer),
            dedup: None,
            uploader: None,
            publisher: None,
        }
    }

    /// Pipeline with every collaborator wired from `cfg`.
    pub fn from_config(cfg: &'a Config) -> Result<Self> {
        let client = build_client(cfg.timeouts.connect())?;
        let speech = TikTokTts::new(
            client.clone(),
            cfg.speech.endpoints.clone(),
            cfg.speech.voices.clone(),
            Duration::from_secs(cfg.timeouts.tts_secs),
        );
        let mut pipeline = Self::new(cfg, client.clone(), Box::new(speech), Box::new(FfmpegToolkit));

        if cfg.features.dedup {
            let timeout = Duration::from_secs(cfg.timeouts.publish_secs);
            pipeline = pipeline.with_dedup(dedup::open_store(&cfg.dedup, client.clone(), timeout));
        }
        if cfg.features.upload {
            let upload_cfg = cfg.upload.as_ref().context("upload section missing")?;
            let timeout = Duration::from_secs(cfg.timeouts.publish_secs);
            pipeline.uploader = Some(Uploader::new(client.clone(), upload_cfg, timeout));
        }
        if cfg.features.publish {
            let publisher = InstagramPublisher::new(
                client,
                &cfg.endpoints.instagram_graph,
                &cfg.instagram.access_token,
                &cfg.instagram.account_id,
                Duration::from_secs(cfg.timeouts.publish_secs),
            )
            .with_polling(cfg.timeouts.poll_interval(), cfg.timeouts.max_polls);
            pipeline.publisher = Some(publisher);
        }
        Ok(pipeline)
    }

    pub fn with_dedup(mut self, store: Box<dyn DedupStore>) -> Self {
        self.dedup = Some(store);
        self
    }

    pub fn with_composer(mut self, composer: Box<dyn ReelComposer>) -> Self {
        self.composer = composer;
        self
    }

    fn checkpoint_path(&self, file: &str) -> PathBuf {
        self.cfg.render.checkpoint_dir.join(file)
    }

    async fn load_fixture(&self) -> Result<SourceScript> {
        let enhanced: EnhancedSummary = summary::load_json(&self.cfg.features.fixture_path).await?;
        let title = match summary::load_json::<StructuredSummary>(&self.checkpoint_path(summary::STRUCTURED_SUMMARY_FILE)).await {
            Ok(structured) if !structured.title.is_empty() => structured.title,
            _ => UNTITLED.to_string(),
        };
        Ok(SourceScript { title, enhanced })
    }

    async fn fetch_and_enhance(&self, video_url: &str) -> Result<Option<SourceScript>> {
        let recall = RecallClient::new(
            self.client.clone(),
            &self.cfg.endpoints.recall,
            &self.cfg.recall_key,
            Duration::from_secs(self.cfg.timeouts.recall_secs),
        );
        let Some(raw) = recall.fetch(video_url).await? else {
            return Ok(None);
        };

        let structured = summary::parse_summary(&raw, video_url)?;
        summary::save_json(&self.checkpoint_path(summary::STRUCTURED_SUMMARY_FILE), &structured).await?;
        logok(format!(
            "Structured summary: \"{}\" ({} sections)",
            structured.title,
            structured.summary.len()
        ));

        let openai = OpenAiClient::new(
            self.client.clone(),
            &self.cfg.endpoints.openai,
            &self.cfg.openai_key,
            &self.cfg.openai_model,
            Duration::from_secs(self.cfg.timeouts.openai_secs),
        );
        let Some(enhanced) = openai.enhance_with_fallback(&structured).await? else {
            return Ok(None);
        };
        summary::save_json(&self.checkpoint_path(summary::ENHANCED_SUMMARY_FILE), &enhanced).await?;

        let title = if structured.title.is_empty() {
            UNTITLED.to_string()
        } else {
            structured.title
        };
        Ok(Some(SourceScript { title, enhanced }))
    }

    async fn acquire_script(&self, video_url: &str) -> Result<Option<SourceScript>> {
        if self.cfg.features.test_fixture {
            logi(format!("Using fixture script {}", self.cfg.features.fixture_path.display()));
            return self.load_fixture().await.map(Some);
        }
        self.fetch_and_enhance(video_url).await
    }

    async fn process_part(
        &self,
        part: &Part,
        source: &SourceScript,
        session: &SynthesisSession,
    ) -> Result<UnitOutcome> {
        // empty first half of a rebalanced split: markers only
        if part.sentences.is_empty() {
            logw(format!("Part {} has no narration sentences; rendering markers only", part.number));
        }

        let workspace = PartWorkspace::create(&self.cfg.render.work_dir, part.number).await?;
        let part_script = PartScript {
            cover: source.enhanced.cover.clone(),
            caption: source.enhanced.caption.clone(),
            script: part.script(),
        };
        summary::save_json(&workspace.part_script(), &part_script).await?;

        let timeline = TimelineBuilder::new(&*self.speech, &*self.audio, self.cfg.speech.speed, self.cfg.speech.gap)
            .with_concurrency(self.cfg.speech.concurrency)
            .with_max_caption_chars(self.cfg.speech.max_caption_chars)
            .build(&part_script.script, session, &workspace)
            .await?;
        if timeline.is_degenerate() {
            return Ok(UnitOutcome::Failed("no sentence produced audio".to_string()));
        }

        let slug = title_slug(&source.title);
        let output = self
            .cfg
            .render
            .output_dir
            .join(&slug)
            .join(format!("reel_output_p{}.mp4", part.number));
        let cover = Some(part_script.cover.as_str()).filter(|c| !c.is_empty());
        let video = self
            .composer
            .compose(&timeline, part.number, cover, &workspace, &output)
            .await?;

        let Some(uploader) = &self.uploader else {
            return Ok(UnitOutcome::Success);
        };
        let Some(public_url) = uploader.upload(&video, &upload::object_key(&slug, part.number)).await? else {
            return Ok(UnitOutcome::Failed("upload rejected".to_string()));
        };

        if let Some(publisher) = &self.publisher {
            let caption = instagram::reel_caption(part.number, &source.title, &source.enhanced.caption);
            if !publisher.publish(&public_url, &caption).await? {
                return Ok(UnitOutcome::Failed("publish did not complete".to_string()));
            }
        }
        Ok(UnitOutcome::Success)
    }

    /// Runs one source video end to end. Errors are folded into the report.
    pub async fn process_video(&self, video_url: &str) -> VideoReport {
        logi(format!("=== Processing: {} ===", video_url));

        if let Some(store) = &self.dedup {
            match store.exists(video_url).await {
                Ok(true) => {
                    logi(format!("Skipping {} (already processed)", video_url));
                    return VideoReport::new(video_url, UnitOutcome::Skipped("already processed".to_string()));
                }
                Ok(false) => {}
                Err(err) => {
                    loge(format!("Dedup lookup failed for {}: {:#}", video_url, err));
                    return VideoReport::new(video_url, UnitOutcome::Failed(format!("dedup lookup: {}", err)));
                }
            }
        }

        let source = match self.acquire_script(video_url).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                logw(format!("Failed to process video {}", video_url));
                return VideoReport::new(video_url, UnitOutcome::Failed("no enhanced summary".to_string()));
            }
            Err(err) => {
                loge(format!("Summary stage failed for {}: {:#}", video_url, err));
                return VideoReport::new(video_url, UnitOutcome::Failed(format!("summary: {}", err)));
            }
        };
        if source.enhanced.script.is_empty() {
            logw(format!("Empty script for {}", video_url));
            return VideoReport::new(video_url, UnitOutcome::Failed("empty script".to_string()));
        }

        let parts = segmenter::segment(
            &source.enhanced.script,
            self.cfg.segment.limits(),
            self.cfg.segment.marker_style(),
        );
        logi(format!("\"{}\" split into {} part(s)", source.title, parts.len()));

        let session = match SynthesisSession::random(&self.cfg.speech.voices) {
            Ok(session) => session,
            Err(err) => return VideoReport::new(video_url, UnitOutcome::Failed(err.to_string())),
        };
        logi(format!("Voice for this video: {}", session.voice_id));

        let mut report = VideoReport::new(video_url, UnitOutcome::Success);
        for part in &parts {
            let outcome = match self.process_part(part, &source, &session).await {
                Ok(outcome) => outcome,
                Err(err) => UnitOutcome::Failed(format!("{:#}", err)),
            };
            match &outcome {
                UnitOutcome::Success => logok(format!("Part {} completed", part.number)),
                UnitOutcome::Skipped(_) => logw(format!("Part {} {}", part.number, outcome)),
                UnitOutcome::Failed(_) => loge(format!("Part {} {}", part.number, outcome)),
            }
            report.parts.push((part.number, outcome));
        }

        let rendered = report.parts.iter().filter(|(_, o)| o.is_success()).count();
        if rendered == 0 {
            report.outcome = UnitOutcome::Failed("no part rendered".to_string());
            return report;
        }

        if let Some(store) = &self.dedup {
            let metadata = json!({ "title": source.title, "parts": parts.len(), "rendered": rendered });
            if let Err(err) = store.record(video_url, &metadata).await {
                logw(format!("Could not record {} as processed: {:#}", video_url, err));
            }
        }
        report
    }
}

/// Most-viewed recent video from the monitored channels.
pub async fn discover_source(cfg: &Config) -> Result<Option<String>> {
    if cfg.youtube_key.is_empty() {
        anyhow::bail!("config.json: youtube_api_key missing");
    }
    let channels = youtube::read_monitor_list(&cfg.monitor.list_path).await?;
    if channels.is_empty() {
        logw(format!("No channels in {}", cfg.monitor.list_path.display()));
        return Ok(None);
    }

    let client = build_client(cfg.timeouts.connect())?;
    let yt = YouTubeClient::new(
        client,
        &cfg.endpoints.youtube,
        &cfg.youtube_key,
        Duration::from_secs(cfg.timeouts.recall_secs),
    );
    let best = yt
        .find_best_video(
            &channels,
            cfg.monitor.hours_ago,
            cfg.monitor.min_duration_secs,
            cfg.monitor.max_duration_secs,
        )
        .await?;
    Ok(best.map(|v| {
        logok(format!("Best video: {} ({} views)", v.title, v.views));
        v.watch_url()
    }))
}

pub async fn run_generation(cfg: &Config, urls: &[String]) -> Result<RunReport> {
    fs::create_dir_all(&cfg.render.output_dir).await?;
    fs::create_dir_all(&cfg.render.checkpoint_dir).await?;
    fs::create_dir_all(&cfg.render.work_dir).await?;

    logi(format!("Clearing {}...", cfg.render.work_dir.display()));
    clear_directory_contents(&cfg.render.work_dir).await?;

    let mut sources: Vec<String> = urls.to_vec();
    if sources.is_empty() && cfg.features.test_fixture {
        sources.push(FIXTURE_SOURCE.to_string());
    }
    if sources.is_empty() {
        logw("No video URLs to process.".to_string());
        return Ok(RunReport::default());
    }

    let pipeline = Pipeline::from_config(cfg)?;
    let mut report = RunReport::default();
    for url in &sources {
        let video = pipeline.process_video(url).await;
        match &video.outcome {
            UnitOutcome::Success => logok(format!("DONE: {}", url)),
            other => logw(format!("{}: {}", url, other)),
        }
        report.videos.push(video);
    }

    logi(format!(
        "All done. Videos: {} ok / {} failed / {} total; parts rendered: {}",
        report.succeeded(),
        report.failed(),
        report.videos.len(),
        report.parts_rendered()
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::JsonFileStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MuteSpeech {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SpeechSynthesizer for MuteSpeech {
        async fn synthesize(&self, _text: &str, _session: &SynthesisSession) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("voice unavailable")
        }
    }

    struct NoAudio;

    #[async_trait]
    impl AudioToolkit for NoAudio {
        async fn prepare_clip(&self, _input: &Path, _speed: f64, _output: &Path) -> Result<f64> {
            anyhow::bail!("no ffmpeg in tests")
        }

        async fn merge_with_gaps(&self, _clips: &[PathBuf], _gap: f64, _output: &Path) -> Result<f64> {
            anyhow::bail!("no ffmpeg in tests")
        }
    }

    /// Every sentence speaks; the bytes are the text.
    struct EchoSpeech {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SpeechSynthesizer for EchoSpeech {
        async fn synthesize(&self, text: &str, _session: &SynthesisSession) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.as_bytes().to_vec())
        }
    }

    /// One second per clip, gaps included exactly in the merge.
    struct SecondPerClip;

    #[async_trait]
    impl AudioToolkit for SecondPerClip {
        async fn prepare_clip(&self, input: &Path, _speed: f64, output: &Path) -> Result<f64> {
            tokio::fs::copy(input, output).await?;
            Ok(1.0)
        }

        async fn merge_with_gaps(&self, clips: &[PathBuf], gap: f64, output: &Path) -> Result<f64> {
            tokio::fs::write(output, b"merged").await?;
            Ok(clips.len() as f64 + gap * (clips.len() as f64 - 1.0))
        }
    }

    /// Writes a placeholder video and remembers which parts it saw.
    struct RecordingComposer {
        parts: Arc<std::sync::Mutex<Vec<(usize, usize)>>>,
    }

    #[async_trait]
    impl ReelComposer for RecordingComposer {
        async fn compose(
            &self,
            timeline: &crate::timeline::Timeline,
            part_number: usize,
            _cover_url: Option<&str>,
            _workspace: &PartWorkspace,
            output: &Path,
        ) -> Result<PathBuf> {
            assert!(timeline.cue_path.as_deref().is_some_and(Path::exists));
            self.parts.lock().unwrap().push((part_number, timeline.cues.len()));
            tokio::fs::create_dir_all(output.parent().unwrap()).await?;
            tokio::fs::write(output, b"mp4").await?;
            Ok(output.to_path_buf())
        }
    }

    fn fixture_config(root: &Path, script: &[&str]) -> Config {
        let fixture = root.join("enhanced_summary.json");
        let body = json!({ "cover": "", "caption": "cap", "script": script });
        std::fs::write(&fixture, body.to_string()).unwrap();

        let text = json!({
            "features": { "test_fixture": true, "fixture_path": fixture },
            "segment": { "char_limit": 20, "upper_limit": 40 },
            "render": {
                "work_dir": root.join("work"),
                "output_dir": root.join("out"),
                "checkpoint_dir": root.join("data")
            }
        });
        Config::from_json(&text.to_string()).unwrap()
    }

    fn pipeline(cfg: &Config) -> (Pipeline<'_>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let speech = MuteSpeech { calls: calls.clone() };
        let p = Pipeline::new(cfg, reqwest::Client::new(), Box::new(speech), Box::new(NoAudio));
        (p, calls)
    }

    #[test]
    fn slugs_are_file_safe() {
        assert_eq!(title_slug("The Art of Focus: Part II"), "the-art-of-focus-part-ii");
        assert_eq!(title_slug("  --  "), "video");
        assert_eq!(title_slug("Café  talk"), "café-talk");
    }

    #[test]
    fn report_counts() {
        let mut ok = VideoReport::new("a", UnitOutcome::Success);
        ok.parts = vec![(1, UnitOutcome::Success), (2, UnitOutcome::Failed("x".into()))];
        let report = RunReport {
            videos: vec![ok, VideoReport::new("b", UnitOutcome::Failed("y".into()))],
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.parts_rendered(), 1);
        assert_eq!(UnitOutcome::Skipped("dup".into()).to_string(), "skipped (dup)");
    }

    #[tokio::test]
    async fn silent_parts_fail_without_stopping_the_video() {
        let root = tempfile::tempdir().unwrap();
        let cfg = fixture_config(root.path(), &["First sentence here.", "Second one.", "Third sentence now."]);
        let (p, calls) = pipeline(&cfg);

        let report = p.process_video(FIXTURE_SOURCE).await;
        assert!(report.parts.len() >= 2);
        for (_, outcome) in &report.parts {
            assert_eq!(outcome, &UnitOutcome::Failed("no sentence produced audio".to_string()));
        }
        assert_eq!(report.outcome, UnitOutcome::Failed("no part rendered".to_string()));

        let spoken: usize = report.parts.len() + 3 + (report.parts.len() - 1);
        assert_eq!(calls.load(Ordering::SeqCst), spoken);
    }

    #[tokio::test]
    async fn failed_video_is_not_recorded_as_processed() {
        let root = tempfile::tempdir().unwrap();
        let cfg = fixture_config(root.path(), &["Only sentence."]);
        let store_path = root.path().join("processed.json");
        let (p, _) = pipeline(&cfg);
        let p = p.with_dedup(Box::new(JsonFileStore::new(store_path.clone())));

        let report = p.process_video("https://y/1").await;
        assert!(!report.outcome.is_success());
        assert!(!JsonFileStore::new(store_path).exists("https://y/1").await.unwrap());
    }

    fn rendering_pipeline(cfg: &Config) -> (Pipeline<'_>, Arc<std::sync::Mutex<Vec<(usize, usize)>>>) {
        let parts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let speech = EchoSpeech {
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let p = Pipeline::new(cfg, reqwest::Client::new(), Box::new(speech), Box::new(SecondPerClip))
            .with_composer(Box::new(RecordingComposer { parts: parts.clone() }));
        (p, parts)
    }

    #[tokio::test]
    async fn rendered_video_is_recorded_as_processed() {
        let root = tempfile::tempdir().unwrap();
        let cfg = fixture_config(root.path(), &["First sentence here.", "Second one.", "Third sentence now."]);
        let store_path = root.path().join("processed.json");
        let (p, composed) = rendering_pipeline(&cfg);
        let p = p.with_dedup(Box::new(JsonFileStore::new(store_path.clone())));

        let report = p.process_video("https://y/1").await;
        assert_eq!(report.outcome, UnitOutcome::Success);
        assert_eq!(report.parts.len(), 3);
        assert!(report.parts.iter().all(|(_, o)| o.is_success()));
        let run = RunReport { videos: vec![report] };
        assert_eq!(run.parts_rendered(), 3);

        // lead marker + sentence, plus the trailing marker on all but the last
        let seen = composed.lock().unwrap().clone();
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 2)]);
        let video = cfg.render.output_dir.join("untitled-video").join("reel_output_p2.mp4");
        assert!(video.is_file());

        assert!(JsonFileStore::new(store_path).exists("https://y/1").await.unwrap());
    }

    #[tokio::test]
    async fn marker_only_first_part_is_still_rendered() {
        let root = tempfile::tempdir().unwrap();
        // 30 chars sits in (20, 40]: halves are [] and the sentence
        let cfg = fixture_config(root.path(), &["A single thirty char sentence."]);
        let (p, composed) = rendering_pipeline(&cfg);

        let report = p.process_video(FIXTURE_SOURCE).await;
        assert_eq!(report.outcome, UnitOutcome::Success);
        assert_eq!(report.parts, vec![(1, UnitOutcome::Success), (2, UnitOutcome::Success)]);
        assert_eq!(composed.lock().unwrap().clone(), vec![(1, 2), (2, 2)]);
    }

    #[tokio::test]
    async fn known_video_is_skipped_before_any_work() {
        let root = tempfile::tempdir().unwrap();
        let cfg = fixture_config(root.path(), &["Only sentence."]);
        let store = JsonFileStore::new(root.path().join("processed.json"));
        store.record("https://y/1", &json!({})).await.unwrap();

        let (p, calls) = pipeline(&cfg);
        let p = p.with_dedup(Box::new(store));
        let report = p.process_video("https://y/1").await;

        assert_eq!(report.outcome, UnitOutcome::Skipped("already processed".to_string()));
        assert!(report.parts.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_fixture_script_fails_the_video() {
        let root = tempfile::tempdir().unwrap();
        let cfg = fixture_config(root.path(), &[]);
        let (p, calls) = pipeline(&cfg);

        let report = p.process_video(FIXTURE_SOURCE).await;
        assert_eq!(report.outcome, UnitOutcome::Failed("empty script".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_fixture_fails_softly() {
        let root = tempfile::tempdir().unwrap();
        let cfg = fixture_config(root.path(), &["x"]);
        std::fs::remove_file(root.path().join("enhanced_summary.json")).unwrap();
        let (p, _) = pipeline(&cfg);

        let report = p.process_video(FIXTURE_SOURCE).await;
        assert!(matches!(report.outcome, UnitOutcome::Failed(ref r) if r.starts_with("summary")));
    }

    #[tokio::test]
    async fn clearing_work_dir_keeps_the_dir() {
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("work");
        std::fs::create_dir_all(work.join("part_1_abc")).unwrap();
        std::fs::write(work.join("part_1_abc/output.wav"), b"x").unwrap();

        clear_directory_contents(&work).await.unwrap();
        assert!(work.is_dir());
        assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);
    }
}
