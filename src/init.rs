use crate::config::Config;
use crate::logi;
use anyhow::Result;
use std::path::PathBuf;
use tokio::fs;

/// Directories the pipeline writes into or reads backgrounds from.
pub fn required_dirs(cfg: &Config) -> Vec<PathBuf> {
    vec![
        cfg.render.backgrounds_dir.clone(),
        cfg.render.output_dir.clone(),
        cfg.render.work_dir.clone(),
        cfg.render.checkpoint_dir.clone(),
    ]
}

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in required_dirs(cfg) {
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

async fn tool_available(tool: &str) -> bool {
    match tokio::process::Command::new(tool).arg("-version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Names of the media tools missing from `PATH`.
pub async fn missing_media_tools() -> Vec<&'static str> {
    let mut missing = Vec::new();
    for tool in ["ffmpeg", "ffprobe"] {
        if !tool_available(tool).await {
            missing.push(tool);
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_configured_directories() {
        let root = tempfile::tempdir().unwrap();
        let text = serde_json::json!({
            "features": { "test_fixture": true },
            "render": {
                "backgrounds_dir": root.path().join("inputs"),
                "output_dir": root.path().join("outputs"),
                "work_dir": root.path().join("work"),
                "checkpoint_dir": root.path().join("operation_data")
            }
        });
        let cfg = Config::from_json(&text.to_string()).unwrap();

        ensure_directories(&cfg).await.unwrap();
        for dir in required_dirs(&cfg) {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        ensure_directories(&cfg).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_missing() {
        assert!(!tool_available("definitely-not-a-real-tool-xyz").await);
    }
}
