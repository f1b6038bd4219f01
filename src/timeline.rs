//! Turns one part's script into a soundtrack and a matching cue track.
//!
//! Every sentence is synthesized separately and measured after decoding.
//! Cues are laid out back to back with `gap` seconds of dead air between
//! them, and the merged soundtrack inserts exactly the same silence, so the
//! last cue's end is the soundtrack length.

use crate::api::tiktok_tts::SynthesisSession;
use crate::srt;
use crate::workspace::PartWorkspace;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Largest tolerated difference between cue arithmetic and the merged track.
pub const DURATION_TOLERANCE: f64 = 0.01;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, session: &SynthesisSession) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait AudioToolkit: Send + Sync {
    /// Applies `speed` to `input`, writes the result to `output` and returns
    /// the measured duration of `output` in seconds.
    async fn prepare_clip(&self, input: &Path, speed: f64, output: &Path) -> Result<f64>;

    /// Concatenates `clips` with `gap` seconds of silence between neighbours
    /// and returns the measured duration of `output`.
    async fn merge_with_gaps(&self, clips: &[PathBuf], gap: f64, output: &Path) -> Result<f64>;
}

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("merged audio is {measured:.3}s but cues end at {expected:.3}s")]
    DurationDrift { expected: f64, measured: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub cues: Vec<Cue>,
    pub clip_durations: Vec<f64>,
    pub total_duration: f64,
    pub audio_path: Option<PathBuf>,
    pub cue_path: Option<PathBuf>,
}

impl Timeline {
    /// No sentence produced audio; nothing can be rendered from it.
    pub fn is_degenerate(&self) -> bool {
        self.cues.is_empty() || self.total_duration <= 0.0
    }

    /// Display captions. Cues longer than `max_chars` are cut at sentence
    /// ends (then word boundaries) and their time span shared out by length.
    /// `max_chars == 0` returns the cues unchanged.
    pub fn captions(&self, max_chars: usize) -> Vec<Cue> {
        if max_chars == 0 {
            return self.cues.clone();
        }

        let mut out = Vec::new();
        for cue in &self.cues {
            let pieces = split_caption(&cue.text, max_chars);
            let total_chars: usize = pieces.iter().map(|p| p.chars().count()).sum();
            if pieces.len() <= 1 || total_chars == 0 {
                out.push(Cue {
                    index: out.len() + 1,
                    ..cue.clone()
                });
                continue;
            }

            let span = cue.end - cue.start;
            let mut at = cue.start;
            let mut consumed = 0usize;
            for piece in pieces {
                consumed += piece.chars().count();
                let end = if consumed == total_chars {
                    cue.end
                } else {
                    cue.start + span * consumed as f64 / total_chars as f64
                };
                out.push(Cue {
                    index: out.len() + 1,
                    start: at,
                    end,
                    text: piece,
                });
                at = end;
            }
        }
        out
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|next| next.is_whitespace() || *next == '"');
        if boundary {
            if chars.peek() == Some(&'"') {
                current.push('"');
                chars.next();
            }
            let piece = current.trim().to_string();
            if !piece.is_empty() {
                out.push(piece);
            }
            current.clear();
        }
    }
    let piece = current.trim().to_string();
    if !piece.is_empty() {
        out.push(piece);
    }
    out
}

fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn split_caption(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.trim().to_string()];
    }
    split_sentences(text)
        .into_iter()
        .flat_map(|sentence| {
            if sentence.chars().count() <= max_chars {
                vec![sentence]
            } else {
                wrap_words(&sentence, max_chars)
            }
        })
        .collect()
}

struct SentenceClip {
    text: String,
    wav: PathBuf,
    duration: f64,
}

/// Lays out cues for `clips` in order, `gap` apart.
fn layout_cues<'a>(clips: impl IntoIterator<Item = (&'a str, f64)>, gap: f64) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut running = 0.0;
    for (text, duration) in clips {
        let start = running;
        running += duration;
        cues.push(Cue {
            index: cues.len() + 1,
            start,
            end: running,
            text: text.trim().to_string(),
        });
        running += gap;
    }
    cues
}

pub struct TimelineBuilder<'a> {
    speech: &'a dyn SpeechSynthesizer,
    audio: &'a dyn AudioToolkit,
    speed: f64,
    gap: f64,
    concurrency: usize,
    max_caption_chars: usize,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(speech: &'a dyn SpeechSynthesizer, audio: &'a dyn AudioToolkit, speed: f64, gap: f64) -> Self {
        Self {
            speech,
            audio,
            speed,
            gap,
            concurrency: 1,
            max_caption_chars: 0,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_caption_chars(mut self, max_chars: usize) -> Self {
        self.max_caption_chars = max_chars;
        self
    }

    async fn render_sentence(
        &self,
        index: usize,
        text: &str,
        session: &SynthesisSession,
        workspace: &PartWorkspace,
    ) -> Option<SentenceClip> {
        let audio = match self.speech.synthesize(text, session).await {
            Ok(audio) if !audio.is_empty() => audio,
            Ok(_) => {
                logw(format!("Sentence {}: speech service returned no audio", index + 1));
                return None;
            }
            Err(err) => {
                logw(format!("Sentence {}: error creating audio: {}", index + 1, err));
                return None;
            }
        };

        let raw = workspace.sentence_audio(index);
        if let Err(err) = fs::write(&raw, &audio).await {
            logw(format!("Sentence {}: cannot write {}: {}", index + 1, raw.display(), err));
            return None;
        }

        let wav = workspace.sentence_wav(index);
        let measured = self.audio.prepare_clip(&raw, self.speed, &wav).await;
        let _ = fs::remove_file(&raw).await;

        match measured {
            Ok(duration) if duration > 0.0 => Some(SentenceClip {
                text: text.to_string(),
                wav,
                duration,
            }),
            Ok(duration) => {
                logw(format!("Sentence {}: unusable duration {:.3}s", index + 1, duration));
                None
            }
            Err(err) => {
                logw(format!("Sentence {}: audio measurement failed: {}", index + 1, err));
                None
            }
        }
    }

    /// Synthesizes `script`, writes the merged soundtrack and cue track into
    /// `workspace`, and returns the resolved timeline. A timeline where no
    /// sentence survived is returned as-is; check [`Timeline::is_degenerate`].
    pub async fn build(
        &self,
        script: &[String],
        session: &SynthesisSession,
        workspace: &PartWorkspace,
    ) -> Result<Timeline> {
        // buffered() yields in input order whatever order requests finish in
        let clips: Vec<SentenceClip> = futures::stream::iter(script.iter().enumerate())
            .map(|(index, text)| self.render_sentence(index, text, session, workspace))
            .buffered(self.concurrency)
            .filter_map(|clip| async move { clip })
            .collect()
            .await;

        logi(format!(
            "Part {}: audio for {}/{} sentences",
            workspace.part_number(),
            clips.len(),
            script.len()
        ));

        if clips.is_empty() {
            return Ok(Timeline::default());
        }

        let cues = layout_cues(clips.iter().map(|c| (c.text.as_str(), c.duration)), self.gap);
        let total_duration = cues.last().map(|c| c.end).unwrap_or(0.0);

        let wavs: Vec<PathBuf> = clips.iter().map(|c| c.wav.clone()).collect();
        let merged_path = workspace.merged_audio();
        let merged = self
            .audio
            .merge_with_gaps(&wavs, self.gap, &merged_path)
            .await
            .context("Failed to merge sentence audio");
        for wav in &wavs {
            let _ = fs::remove_file(wav).await;
        }
        let measured = merged?;

        if (measured - total_duration).abs() >= DURATION_TOLERANCE {
            return Err(TimelineError::DurationDrift {
                expected: total_duration,
                measured,
            }
            .into());
        }
        logok(format!(
            "Part {}: merged audio {:.3}s (cues {:.3}s)",
            workspace.part_number(),
            measured,
            total_duration
        ));

        let timeline = Timeline {
            clip_durations: clips.iter().map(|c| c.duration).collect(),
            cues,
            total_duration,
            audio_path: Some(merged_path),
            cue_path: Some(workspace.cue_track()),
        };

        let cue_path = workspace.cue_track();
        srt::write_srt(&cue_path, &timeline.captions(self.max_caption_chars)).await?;
        Ok(timeline)
    }
}
