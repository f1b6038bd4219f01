use crate::timeline::Cue;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// `HH:MM:SS,mmm`, rounded to the nearest millisecond.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let m = (total_sec / 60) % 60;
    let h = total_sec / 3600;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

fn timestamp_to_seconds(ts: &str) -> Option<f64> {
    let mut parts = ts.trim().split([':', ',']);
    let hh: u64 = parts.next()?.parse().ok()?;
    let mm: u64 = parts.next()?.parse().ok()?;
    let ss: u64 = parts.next()?.parse().ok()?;
    let ms: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((hh * 3600 + mm * 60 + ss) as f64 + ms as f64 / 1000.0)
}

pub fn render(cues: &[Cue]) -> String {
    let mut out = String::new();
    for cue in cues {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            format_timestamp(cue.start),
            format_timestamp(cue.end),
            cue.text.trim()
        ));
    }
    out
}

/// Reads cues back from SRT text. Malformed blocks are skipped.
pub fn parse(text: &str) -> Vec<Cue> {
    let normalized = text.replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n") {
        let mut lines = block.lines().filter(|l| !l.trim().is_empty());
        let Some(index) = lines.next().and_then(|l| l.trim().parse::<usize>().ok()) else {
            continue;
        };
        let Some((a, b)) = lines.next().and_then(|l| l.split_once(" --> ")) else {
            continue;
        };
        let (Some(start), Some(end)) = (timestamp_to_seconds(a), timestamp_to_seconds(b)) else {
            continue;
        };
        let text = lines.collect::<Vec<_>>().join("\n");
        cues.push(Cue {
            index,
            start,
            end,
            text,
        });
    }
    cues
}

pub async fn write_srt(path: &Path, cues: &[Cue]) -> Result<()> {
    let mut out = fs::File::create(path)
        .await
        .with_context(|| format!("create srt output: {}", path.display()))?;
    out.write_all(render(cues).as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
