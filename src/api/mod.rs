pub mod instagram;
pub mod openai;
pub mod recall;
pub mod tiktok_tts;
pub mod youtube;

use anyhow::{Context, Result};
use std::time::Duration;

pub(crate) fn build_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_store(true)
        .connect_timeout(connect_timeout)
        .build()
        .context("Failed to build HTTP client")
}

pub(crate) fn body_snippet(raw: &str) -> String {
    raw.chars().take(800).collect()
}
