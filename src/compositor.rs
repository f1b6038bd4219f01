use crate::config::RenderConfig;
use crate::ffmpeg::{self, BackgroundSegment, ReelRender};
use crate::timeline::Timeline;
use crate::workspace::PartWorkspace;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// How background footage is picked for a reel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClipMode {
    /// One background, random start.
    #[default]
    Normal,
    /// Several backgrounds chained with fades.
    Combine,
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("no background footage found in {0}")]
    NoBackgrounds(PathBuf),
    #[error("no background is at least {needed:.2}s long")]
    NoLongEnoughBackground { needed: f64 },
    #[error("not enough footage: need {needed:.2}s, have {available:.2}s")]
    NotEnoughFootage { needed: f64, available: f64 },
    #[error("refusing to render a reel of {0:.3}s")]
    InvalidDuration(f64),
}

/// A background file with its probed duration.
#[derive(Debug, Clone, PartialEq)]
pub struct Footage {
    pub path: PathBuf,
    pub duration: f64,
}

pub async fn list_backgrounds(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }

    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_mp4 = path
            .extension()
            .and_then(OsStr::to_str)
            .map(|e| e.eq_ignore_ascii_case("mp4"))
            .unwrap_or(false);
        if path.is_file() && is_mp4 {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub fn plan_normal<R: Rng>(
    footage: &[Footage],
    total: f64,
    rng: &mut R,
) -> Result<Vec<BackgroundSegment>, ComposeError> {
    let fitting: Vec<&Footage> = footage.iter().filter(|f| f.duration >= total).collect();
    let chosen = fitting
        .choose(rng)
        .ok_or(ComposeError::NoLongEnoughBackground { needed: total })?;
    let start = rng.gen_range(0.0..=(chosen.duration - total));
    Ok(vec![BackgroundSegment {
        path: chosen.path.clone(),
        start,
        duration: total,
    }])
}

/// Shuffles the footage and takes whole clips, without repeats, until
/// `total` is covered. The last clip is cut to the remainder.
pub fn plan_combine<R: Rng>(
    footage: &[Footage],
    total: f64,
    rng: &mut R,
) -> Result<Vec<BackgroundSegment>, ComposeError> {
    let available: f64 = footage.iter().map(|f| f.duration.max(0.0)).sum();
    if available < total {
        return Err(ComposeError::NotEnoughFootage {
            needed: total,
            available,
        });
    }

    let mut order: Vec<&Footage> = footage.iter().filter(|f| f.duration > 0.0).collect();
    order.shuffle(rng);

    let mut segments = Vec::new();
    let mut remaining = total;
    for f in order {
        if remaining <= 0.0 {
            break;
        }
        let take = f.duration.min(remaining);
        segments.push(BackgroundSegment {
            path: f.path.clone(),
            start: 0.0,
            duration: take,
        });
        remaining -= take;
    }
    Ok(segments)
}

async fn download_cover(client: &reqwest::Client, url: &str, dest: &Path) -> Result<bool> {
    let resp = client
        .get(url)
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .context("cover download failed")?;
    if !resp.status().is_success() {
        logw(format!("Cover download returned {} for {}", resp.status(), url));
        return Ok(false);
    }
    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Ok(false);
    }
    fs::write(dest, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(true)
}

/// Turns a finished [`Timeline`] into a vertical video at `output`.
#[async_trait]
pub trait ReelComposer: Send + Sync {
    async fn compose(
        &self,
        timeline: &Timeline,
        part_number: usize,
        cover_url: Option<&str>,
        workspace: &PartWorkspace,
        output: &Path,
    ) -> Result<PathBuf>;
}

/// ffmpeg-backed [`ReelComposer`] over the footage in `backgrounds_dir`.
pub struct Compositor {
    client: reqwest::Client,
    backgrounds_dir: PathBuf,
    mode: ClipMode,
    fps: u32,
    video_bitrate: String,
    font: String,
}

impl Compositor {
    pub fn new(client: reqwest::Client, render: &RenderConfig) -> Self {
        Self {
            client,
            backgrounds_dir: render.backgrounds_dir.clone(),
            mode: render.clip_mode,
            fps: render.fps,
            video_bitrate: render.video_bitrate.clone(),
            font: render.font.clone(),
        }
    }

    async fn probe_backgrounds(&self) -> Result<Vec<Footage>> {
        let files = list_backgrounds(&self.backgrounds_dir).await?;
        if files.is_empty() {
            return Err(ComposeError::NoBackgrounds(self.backgrounds_dir.clone()).into());
        }

        let mut footage = Vec::with_capacity(files.len());
        for path in files {
            if let Err(err) = ffmpeg::ffprobe_video_dimensions(&path).await {
                logw(format!("Skipping background {} without a video stream: {}", path.display(), err));
                continue;
            }
            match ffmpeg::ffprobe_duration_seconds(&path).await {
                Ok(duration) => footage.push(Footage { path, duration }),
                Err(err) => logw(format!("Skipping background {}: {}", path.display(), err)),
            }
        }
        Ok(footage)
    }
}

#[async_trait]
impl ReelComposer for Compositor {
    async fn compose(
        &self,
        timeline: &Timeline,
        part_number: usize,
        cover_url: Option<&str>,
        workspace: &PartWorkspace,
        output: &Path,
    ) -> Result<PathBuf> {
        if timeline.is_degenerate() {
            return Err(ComposeError::InvalidDuration(timeline.total_duration).into());
        }
        let total = timeline.total_duration;
        let (Some(audio), Some(cue_track)) = (timeline.audio_path.as_deref(), timeline.cue_path.as_deref()) else {
            anyhow::bail!("part {} has no merged audio or cue track", part_number);
        };

        let footage = self.probe_backgrounds().await?;
        let segments = {
            let mut rng = rand::thread_rng();
            match self.mode {
                ClipMode::Normal => plan_normal(&footage, total, &mut rng)?,
                ClipMode::Combine => plan_combine(&footage, total, &mut rng)?,
            }
        };
        logi(format!(
            "Part {}: {} background segment(s) for {:.2}s",
            part_number,
            segments.len(),
            total
        ));

        let cover_path = workspace.cover_image();
        let has_cover = match cover_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => match download_cover(&self.client, url, &cover_path).await {
                Ok(ok) => ok,
                Err(err) => {
                    logw(format!("Cover unavailable for part {}: {}", part_number, err));
                    false
                }
            },
            None => false,
        };

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }

        let label = format!("Part {}", part_number);
        let job = ReelRender {
            backgrounds: &segments,
            audio,
            cue_track,
            cover_image: has_cover.then_some(cover_path.as_path()),
            part_label: &label,
            duration: total,
            fps: self.fps,
            video_bitrate: &self.video_bitrate,
            font: &self.font,
            output,
        };
        if !ffmpeg::ffmpeg_render_reel(&job).await? {
            anyhow::bail!("render produced no video for part {}", part_number);
        }
        logok(format!("Rendered part {} -> {}", part_number, output.display()));
        Ok(output.to_path_buf())
    }
}
