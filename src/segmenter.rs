//! Splits a narration script into parts that each fit one reel.
//!
//! Sentences are never cut. A part is closed greedily once the next sentence
//! would push it past `char_limit`. At every part boundary, a remaining tail
//! whose length lands between `char_limit` and `upper_limit` is instead halved
//! by sentence count, so the last video is not left with a thin remainder.

use serde::{Deserialize, Serialize};

pub const TO_BE_CONTINUED: &str = "To be continued in the next video";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLimits {
    pub char_limit: usize,
    pub upper_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerStyle {
    /// "Part 3."
    PartOnly,
    /// "Part 3. Continued from part 2"
    #[default]
    WithContinuation,
}

impl MarkerStyle {
    pub fn lead_marker(self, number: usize) -> String {
        match self {
            MarkerStyle::WithContinuation if number > 1 => {
                format!("Part {}. Continued from part {}", number, number - 1)
            }
            _ => format!("Part {}.", number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// 1-based position among the parts of one script.
    pub number: usize,
    pub lead_marker: String,
    pub sentences: Vec<String>,
    pub trailing_marker: Option<String>,
}

impl Part {
    /// Markers and sentences in spoken order.
    pub fn script(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.sentences.len() + 2);
        out.push(self.lead_marker.clone());
        out.extend(self.sentences.iter().cloned());
        if let Some(tail) = &self.trailing_marker {
            out.push(tail.clone());
        }
        out
    }

    /// Character count of the narration, markers excluded.
    pub fn narration_chars(&self) -> usize {
        char_sum(&self.sentences)
    }

    pub fn is_last(&self) -> bool {
        self.trailing_marker.is_none()
    }
}

fn char_len(sentence: &str) -> usize {
    sentence.chars().count()
}

fn char_sum(sentences: &[String]) -> usize {
    sentences.iter().map(|s| char_len(s)).sum()
}

/// Remaining sentences whose total lands in `(char_limit, upper_limit]` are
/// halved by count instead of packed greedily.
fn rebalanced_tail(tail: &[String], char_limit: usize, upper_limit: usize) -> Option<[Vec<String>; 2]> {
    let remaining = char_sum(tail);
    if remaining > char_limit && remaining <= upper_limit {
        let mid = tail.len() / 2;
        return Some([tail[..mid].to_vec(), tail[mid..].to_vec()]);
    }
    None
}

/// Raw partition of `sentences`, before any markers are added.
pub fn split_script(sentences: &[String], char_limit: usize, upper_limit: usize) -> Vec<Vec<String>> {
    let mut parts: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_chars = 0usize;

    for (i, sentence) in sentences.iter().enumerate() {
        let len = char_len(sentence);
        let at_boundary = current.is_empty() || current_chars + len > char_limit;
        if at_boundary {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            if let Some(halves) = rebalanced_tail(&sentences[i..], char_limit, upper_limit) {
                parts.extend(halves);
                return parts;
            }
        }
        current.push(sentence.clone());
        current_chars += len;
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Splits `sentences` into numbered parts with lead and trailing markers.
pub fn segment(sentences: &[String], limits: SegmentLimits, style: MarkerStyle) -> Vec<Part> {
    let raw = split_script(sentences, limits.char_limit, limits.upper_limit);
    let total = raw.len();
    raw.into_iter()
        .enumerate()
        .map(|(idx, sentences)| {
            let number = idx + 1;
            Part {
                number,
                lead_marker: style.lead_marker(number),
                sentences,
                trailing_marker: (number < total).then(|| TO_BE_CONTINUED.to_string()),
            }
        })
        .collect()
}
