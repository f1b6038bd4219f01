use crate::logw;
use crate::timeline::AudioToolkit;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const REEL_WIDTH: u32 = 1080;
pub const REEL_HEIGHT: u32 = 1920;
pub const SAMPLE_RATE: u32 = 44_100;
pub const FADE_SECONDS: f64 = 0.5;
pub const PART_LABEL_SECONDS: f64 = 5.0;

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

fn ffmpeg_base() -> Vec<String> {
    ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(i32, i32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts
        .next()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);
    let h = parts
        .next()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);

    if w <= 0 || h <= 0 {
        return Err(anyhow::anyhow!("Invalid dimensions"));
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.0 {
        return Err(anyhow::anyhow!("Invalid duration for {}", path.display()));
    }
    Ok(duration)
}

/// `atempo` only accepts factors in [0.5, 100]; slower speeds are chained.
pub fn atempo_chain(speed: f64) -> String {
    let mut speed = speed.clamp(0.01, 100.0);
    let mut stages = Vec::new();
    while speed < 0.5 {
        stages.push("atempo=0.5".to_string());
        speed /= 0.5;
    }
    stages.push(format!("atempo={:.6}", speed));
    stages.join(",")
}

/// Re-encodes `input` to mono 16-bit PCM WAV at a fixed rate, applying
/// `speed` as a tempo change. WAV output keeps the measured duration
/// sample-exact for the later merge.
pub async fn ffmpeg_to_wav_with_tempo(input: &Path, speed: f64, out_wav: &Path) -> Result<bool> {
    let mut args = ffmpeg_base();
    args.extend([
        "-i".to_string(),
        input.display().to_string(),
        "-filter:a".to_string(),
        atempo_chain(speed),
        "-ar".to_string(),
        SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
        out_wav.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(out_wav.exists())
}

pub(crate) fn merge_filter(clip_count: usize, gap: f64) -> String {
    let mut filter = String::new();
    for i in 0..clip_count {
        if i + 1 < clip_count && gap > 0.0 {
            filter.push_str(&format!("[{i}:a]apad=pad_dur={gap:.6}[a{i}];"));
        } else {
            filter.push_str(&format!("[{i}:a]anull[a{i}];"));
        }
    }
    for i in 0..clip_count {
        filter.push_str(&format!("[a{i}]"));
    }
    filter.push_str(&format!("concat=n={clip_count}:v=0:a=1[out]"));
    filter
}

/// Joins `clips` in order with `gap` seconds of silence between neighbours.
pub async fn ffmpeg_merge_with_gaps(clips: &[PathBuf], gap: f64, out_wav: &Path) -> Result<bool> {
    if clips.is_empty() {
        return Ok(false);
    }

    let mut args = ffmpeg_base();
    for clip in clips {
        args.push("-i".to_string());
        args.push(clip.display().to_string());
    }
    args.extend([
        "-filter_complex".to_string(),
        merge_filter(clips.len(), gap),
        "-map".to_string(),
        "[out]".to_string(),
        "-ar".to_string(),
        SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
        out_wav.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(out_wav.exists())
}

/// Quotes a path for use as a filter option value.
pub(crate) fn escape_filter_path(path: &Path) -> String {
    let raw = path.display().to_string();
    let mut out = String::with_capacity(raw.len() + 2);
    for ch in raw.chars() {
        match ch {
            '\\' | '\'' | ':' | ',' | '[' | ']' | ';' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

fn escape_drawtext(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        match ch {
            '\\' | '\'' | ':' | '%' | ',' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// A stretch of background footage used in the final render.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSegment {
    pub path: PathBuf,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone)]
pub struct ReelRender<'a> {
    pub backgrounds: &'a [BackgroundSegment],
    pub audio: &'a Path,
    pub cue_track: &'a Path,
    pub cover_image: Option<&'a Path>,
    pub part_label: &'a str,
    pub duration: f64,
    pub fps: u32,
    pub video_bitrate: &'a str,
    pub font: &'a str,
    pub output: &'a Path,
}

pub(crate) fn render_filter(job: &ReelRender<'_>) -> String {
    let n = job.backgrounds.len();
    let mut filter = String::new();

    for (i, seg) in job.backgrounds.iter().enumerate() {
        filter.push_str(&format!(
            "[{i}:v]crop='min(iw,ih*9/16)':'min(ih,iw*16/9)',scale={w}:{h},setsar=1,fps={fps}",
            w = REEL_WIDTH,
            h = REEL_HEIGHT,
            fps = job.fps
        ));
        if n > 1 {
            if i > 0 {
                filter.push_str(&format!(",fade=t=in:st=0:d={FADE_SECONDS}"));
            }
            if i + 1 < n {
                let st = (seg.duration - FADE_SECONDS).max(0.0);
                filter.push_str(&format!(",fade=t=out:st={st:.3}:d={FADE_SECONDS}"));
            }
        }
        filter.push_str(&format!("[bg{i}];"));
    }

    for i in 0..n {
        filter.push_str(&format!("[bg{i}]"));
    }
    filter.push_str(&format!("concat=n={n}:v=1:a=0[bg];"));

    filter.push_str(&format!(
        "[bg]subtitles=filename='{}':force_style='Fontname={},Fontsize=16,PrimaryColour=&H00FFFFFF,OutlineColour=&H00000000,BorderStyle=1,Outline=2,Alignment=5'[sub];",
        escape_filter_path(job.cue_track),
        job.font
    ));

    filter.push_str(&format!(
        "[sub]drawtext=text='{}':font='{}':fontsize=100:fontcolor=white:borderw=3:bordercolor=black:x=(w-text_w)/2:y=h*0.1:enable='lt(t,{})'",
        escape_drawtext(job.part_label),
        job.font,
        PART_LABEL_SECONDS
    ));

    if job.cover_image.is_some() {
        let cover_input = n + 1;
        filter.push_str(&format!(
            "[lab];[{cover_input}:v]scale=-1:500[cov];[lab][cov]overlay=x=(W-w)/2:y=H*0.2[v]"
        ));
    } else {
        filter.push_str("[v]");
    }
    filter
}

/// Renders the vertical reel: cropped background, burnt-in cues, part label,
/// optional cover image and the narration track, cut to `job.duration`.
pub async fn ffmpeg_render_reel(job: &ReelRender<'_>) -> Result<bool> {
    if job.backgrounds.is_empty() || job.duration <= 0.0 {
        return Ok(false);
    }

    let mut args = ffmpeg_base();
    for seg in job.backgrounds {
        args.extend([
            "-ss".to_string(),
            format!("{:.3}", seg.start),
            "-t".to_string(),
            format!("{:.3}", seg.duration),
            "-i".to_string(),
            seg.path.display().to_string(),
        ]);
    }
    args.extend(["-i".to_string(), job.audio.display().to_string()]);
    if let Some(cover) = job.cover_image {
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            cover.display().to_string(),
        ]);
    }

    let audio_input = job.backgrounds.len();
    args.extend([
        "-filter_complex".to_string(),
        render_filter(job),
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        format!("{}:a", audio_input),
        "-t".to_string(),
        format!("{:.3}", job.duration),
        "-r".to_string(),
        job.fps.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "faster".to_string(),
        "-b:v".to_string(),
        job.video_bitrate.to_string(),
        "-threads".to_string(),
        "4".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        job.output.display().to_string(),
    ]);

    if let Err(err) = run_cmd(&args).await {
        logw(format!("Reel render failed: {}", err));
        return Ok(false);
    }

    Ok(job.output.exists())
}

/// [`AudioToolkit`] backed by the ffmpeg/ffprobe binaries.
pub struct FfmpegToolkit;

#[async_trait]
impl AudioToolkit for FfmpegToolkit {
    async fn prepare_clip(&self, input: &Path, speed: f64, output: &Path) -> Result<f64> {
        if !ffmpeg_to_wav_with_tempo(input, speed, output).await? {
            anyhow::bail!("ffmpeg produced no clip at {}", output.display());
        }
        ffprobe_duration_seconds(output).await
    }

    async fn merge_with_gaps(&self, clips: &[PathBuf], gap: f64, output: &Path) -> Result<f64> {
        if !ffmpeg_merge_with_gaps(clips, gap, output).await? {
            anyhow::bail!("ffmpeg produced no merged audio at {}", output.display());
        }
        ffprobe_duration_seconds(output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atempo_chain_handles_slow_speeds() {
        assert_eq!(atempo_chain(1.15), "atempo=1.150000");
        assert_eq!(atempo_chain(0.25), "atempo=0.5,atempo=0.500000");
    }

    #[test]
    fn merge_filter_pads_all_but_last_clip() {
        let f = merge_filter(3, 0.1);
        assert_eq!(
            f,
            "[0:a]apad=pad_dur=0.100000[a0];[1:a]apad=pad_dur=0.100000[a1];[2:a]anull[a2];[a0][a1][a2]concat=n=3:v=0:a=1[out]"
        );
        assert_eq!(merge_filter(1, 0.1), "[0:a]anull[a0];[a0]concat=n=1:v=0:a=1[out]");
    }

    #[test]
    fn filter_paths_are_escaped() {
        let p = Path::new("/tmp/it's:here/output.srt");
        assert_eq!(escape_filter_path(p), "/tmp/it\\'s\\:here/output.srt");
    }

    fn job<'a>(bgs: &'a [BackgroundSegment], cover: Option<&'a Path>) -> ReelRender<'a> {
        ReelRender {
            backgrounds: bgs,
            audio: Path::new("/w/output.wav"),
            cue_track: Path::new("/w/output.srt"),
            cover_image: cover,
            part_label: "Part 2",
            duration: 12.5,
            fps: 30,
            video_bitrate: "4000k",
            font: "Arial-Bold",
            output: Path::new("/o/reel.mp4"),
        }
    }

    #[test]
    fn single_background_has_no_fades_and_cover_is_last_input() {
        let bgs = vec![BackgroundSegment {
            path: "a.mp4".into(),
            start: 3.0,
            duration: 12.5,
        }];
        let f = render_filter(&job(&bgs, Some(Path::new("/w/cover.img"))));
        assert!(!f.contains("fade="));
        assert!(f.contains("concat=n=1:v=1:a=0[bg]"));
        assert!(f.contains("[2:v]scale=-1:500[cov]"));
        assert!(f.ends_with("overlay=x=(W-w)/2:y=H*0.2[v]"));
        assert!(f.contains("text='Part 2'"));
    }

    #[test]
    fn combined_backgrounds_fade_between_segments() {
        let bgs = vec![
            BackgroundSegment {
                path: "a.mp4".into(),
                start: 0.0,
                duration: 6.0,
            },
            BackgroundSegment {
                path: "b.mp4".into(),
                start: 0.0,
                duration: 7.0,
            },
        ];
        let f = render_filter(&job(&bgs, None));
        assert!(f.contains("[0:v]crop='min(iw,ih*9/16)':'min(ih,iw*16/9)',scale=1080:1920,setsar=1,fps=30,fade=t=out:st=5.500:d=0.5[bg0]"));
        assert!(f.contains("fps=30,fade=t=in:st=0:d=0.5[bg1]"));
        assert!(f.ends_with("[v]"));
        assert!(!f.contains("[cov]"));
    }
}
