use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tokio::fs;

pub const STRUCTURED_SUMMARY_FILE: &str = "structured_summary.json";
pub const ENHANCED_SUMMARY_FILE: &str = "enhanced_summary.json";

const SIMPLIFIED_BULLETS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredSummary {
    pub title: String,
    pub cover: String,
    pub tags: Vec<String>,
    /// Section heading -> bullet texts, in document order.
    pub summary: Map<String, Value>,
    pub video_url: String,
}

impl StructuredSummary {
    pub fn section(&self, name: &str) -> Vec<String> {
        self.summary
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Same summary with every section cut to its first few bullets.
    pub fn simplified(&self) -> Self {
        let summary = self
            .summary
            .iter()
            .map(|(name, bullets)| {
                let cut = match bullets {
                    Value::Array(items) => {
                        Value::Array(items.iter().take(SIMPLIFIED_BULLETS).cloned().collect())
                    }
                    other => other.clone(),
                };
                (name.clone(), cut)
            })
            .collect();

        Self {
            title: self.title.clone(),
            cover: self.cover.clone(),
            tags: self.tags.clone(),
            summary,
            video_url: self.video_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSummary {
    pub cover: String,
    pub caption: String,
    pub script: Vec<String>,
}

/// Content of the per-part temporary script file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartScript {
    pub cover: String,
    pub caption: String,
    pub script: Vec<String>,
}

fn bullet_regex() -> Result<&'static Regex> {
    static BULLET_RE: OnceCell<Regex> = OnceCell::new();
    BULLET_RE.get_or_try_init(|| {
        Regex::new(r"(.*) \[(.*?)\]\((.*?)\)").context("failed to compile bullet regex")
    })
}

/// Builds a [`StructuredSummary`] from the raw summarizer document.
pub fn parse_summary(raw: &Value, video_url: &str) -> Result<StructuredSummary> {
    let mut out = StructuredSummary {
        title: raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        video_url: video_url.to_string(),
        ..Default::default()
    };

    if let Some(first) = raw
        .get("images")
        .and_then(Value::as_array)
        .and_then(|images| images.first())
    {
        out.cover = first
            .get("urlOriginal")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }

    if let Some(links) = raw.get("links").and_then(Value::as_array) {
        out.tags = links
            .iter()
            .filter_map(|link| link.pointer("/item/name").and_then(Value::as_str))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
    }

    let re = bullet_regex()?;
    let markdown = raw.get("markdown").and_then(Value::as_str).unwrap_or_default();
    let mut current: Option<String> = None;

    for line in markdown.split('\n') {
        if let Some(heading) = line.strip_prefix("## ") {
            let title = heading.split(" [(").next().unwrap_or(heading).trim().to_string();
            out.summary.insert(title.clone(), Value::Array(Vec::new()));
            current = Some(title);
        } else if let Some(bullet) = line.strip_prefix("- ") {
            let (Some(section), Some(caps)) = (current.as_ref(), re.captures(bullet)) else {
                continue;
            };
            let text = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            if let Some(Value::Array(items)) = out.summary.get_mut(section) {
                items.push(Value::String(text.to_string()));
            }
        }
    }

    Ok(out)
}

pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_doc() -> Value {
        json!({
            "name": "How Sleep Works",
            "images": [{"urlOriginal": "https://img.example/cover.jpg"}, {"urlOriginal": "x"}],
            "links": [
                {"item": {"name": "Sleep"}},
                {"item": {"name": ""}},
                {"item": {}},
                {"item": {"name": "Health"}}
            ],
            "markdown": "- orphan bullet [1](https://y.example)\n## Introduction [(00:00)](https://y.example)\n- Sleep is vital [00:12](https://y.example?t=12)\n- no link here\n## Deep Sleep\n- Slow waves clean the brain [01:02](https://y.example?t=62)\n- Hormones peak [01:40](https://y.example?t=100)\n- Memory consolidates [02:00](u)\n- Fourth point [02:30](u)\n"
        })
    }

    #[test]
    fn parses_title_cover_tags_and_sections() {
        let summary = parse_summary(&raw_doc(), "https://youtube.com/watch?v=abc").unwrap();
        assert_eq!(summary.title, "How Sleep Works");
        assert_eq!(summary.cover, "https://img.example/cover.jpg");
        assert_eq!(summary.tags, vec!["Sleep", "Health"]);
        assert_eq!(summary.video_url, "https://youtube.com/watch?v=abc");

        let sections: Vec<&String> = summary.summary.keys().collect();
        assert_eq!(sections, vec!["Introduction", "Deep Sleep"]);
        assert_eq!(summary.section("Introduction"), vec!["Sleep is vital"]);
        assert_eq!(summary.section("Deep Sleep").len(), 4);
    }

    #[test]
    fn missing_fields_give_empty_summary() {
        let summary = parse_summary(&json!({}), "u").unwrap();
        assert_eq!(summary.title, "");
        assert_eq!(summary.cover, "");
        assert!(summary.tags.is_empty());
        assert!(summary.summary.is_empty());
    }

    #[test]
    fn simplified_keeps_first_three_bullets() {
        let summary = parse_summary(&raw_doc(), "u").unwrap().simplified();
        assert_eq!(
            summary.section("Deep Sleep"),
            vec!["Slow waves clean the brain", "Hormones peak", "Memory consolidates"]
        );
        assert_eq!(summary.section("Introduction").len(), 1);
        assert_eq!(summary.title, "How Sleep Works");
    }

    #[tokio::test]
    async fn json_checkpoint_roundtrip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operation_data").join(ENHANCED_SUMMARY_FILE);
        let enhanced = EnhancedSummary {
            cover: "c".into(),
            caption: "cap".into(),
            script: vec!["One.".into(), "Two.".into()],
        };
        save_json(&path, &enhanced).await.unwrap();
        let back: EnhancedSummary = load_json(&path).await.unwrap();
        assert_eq!(back, enhanced);
    }
}
