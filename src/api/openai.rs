use crate::api::body_snippet;
use crate::summary::{EnhancedSummary, StructuredSummary};
use crate::{logi, logw};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

const FUNCTION_NAME: &str = "create_enhanced_summary";
const MAX_SUMMARY_CHARS: usize = 60_000;

const SYSTEM_PROMPT: &str = "You are an expert storyteller and Instagram Reels content creator for promoting a company called Recall. Recall's product is for quickly summarizing Youtube videos and podcasts.";

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

fn function_schema() -> Value {
    json!([{
        "name": FUNCTION_NAME,
        "description": "Create an enhanced summary of a video for an Instagram Reel in a specific JSON format",
        "parameters": {
            "type": "object",
            "properties": {
                "cover": {"type": "string", "description": "The cover image URL"},
                "caption": {"type": "string", "description": "An engaging caption for Instagram Reel, including key points and hashtags"},
                "script": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "An array of strings, each containing a sentence or short paragraph for the Reel script"
                }
            },
            "required": ["cover", "caption", "script"]
        }
    }])
}

pub(crate) fn build_prompt(summary: &StructuredSummary) -> Result<String> {
    let title = if summary.title.is_empty() {
        "Untitled Video"
    } else {
        summary.title.as_str()
    };
    let summary_json = serde_json::to_string_pretty(summary)?;
    let summary_json = trim_copy_utf8_safe(&summary_json, MAX_SUMMARY_CHARS);

    Ok(format!(
        "Enhance the following structured summary of a video into an engaging Instagram Reel script and caption.\nFor the script:\n1. Start by mentioning the original YouTube video's title: \"{}\" Then, mention that this video is summarized by Recall.\n2. Add transitions and context for a smoother narrative flow when necessary.\n3. Aim for impactful short sentences suitable for Instagram Reel.\n4. Do not include any questions in the script. Questions are not suitable for AI voice narration as they cannot be read with proper intonation.\n5. Avoid using parentheses for explanations, as AI will read the text within them verbatim.\n6. Include a clear and engaging ending to the script, encouraging viewers to check out the full summary using Recall's AI tool.\n\nFor the caption:\n1. Pose a question or make a statement that captures the main theme of the video. Introduce the key topics covered in the video in one sentence\n2. Mention Recall and its official website https://www.getrecall.ai/. Invite users to check out the original video and use Recall's AI tool for the FULL summaries.\n3. Include the original YouTube video URL: {}.\n4. Select at least 5 relevant hashtags from the \"tags\" field provided in the structured summary, and include #RecallAI as one of the hashtags.\n\nHere's the structured summary to enhance:\n\n{}\n",
        title, summary.video_url, summary_json
    ))
}

/// Pulls the forced function call's arguments out of a chat-completions response.
fn extract_function_arguments(resp_json: &str) -> Option<String> {
    let root: Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error message: {}", msg));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error code: {}", code));
        }
        return None;
    }

    let call = root.pointer("/choices/0/message/function_call")?;
    if call.get("name").and_then(|v| v.as_str()) != Some(FUNCTION_NAME) {
        return None;
    }
    call.get("arguments")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(client: Client, base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    /// One enhancement attempt. `Ok(None)` when the model or API did not produce
    /// a usable function call.
    pub async fn enhance(&self, summary: &StructuredSummary) -> Result<Option<EnhancedSummary>> {
        let prompt = build_prompt(summary)?;
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "functions": function_schema(),
            "function_call": {"name": FUNCTION_NAME},
            "temperature": 0.7,
            "max_tokens": 4000,
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            logw(format!("OpenAI HTTP {}", status.as_u16()));
            if !raw.is_empty() {
                logw(format!("OpenAI raw body: {}", body_snippet(&raw)));
            }
            return Ok(None);
        }

        let Some(arguments) = extract_function_arguments(&raw) else {
            logw("Unexpected response format from OpenAI API".to_string());
            if !raw.is_empty() {
                logw(format!("OpenAI raw body: {}", body_snippet(&raw)));
            }
            return Ok(None);
        };

        match serde_json::from_str::<EnhancedSummary>(&arguments) {
            Ok(enhanced) if !enhanced.script.is_empty() => {
                logi(format!("OpenAI script received: {} sentences", enhanced.script.len()));
                Ok(Some(enhanced))
            }
            Ok(_) => {
                logw("OpenAI returned an empty script".to_string());
                Ok(None)
            }
            Err(err) => {
                logw(format!("OpenAI function arguments did not match schema: {}", err));
                Ok(None)
            }
        }
    }

    /// Enhances `summary`, retrying once with a shortened summary on failure.
    pub async fn enhance_with_fallback(
        &self,
        summary: &StructuredSummary,
    ) -> Result<Option<EnhancedSummary>> {
        if let Some(enhanced) = self.enhance(summary).await? {
            return Ok(Some(enhanced));
        }
        logw("Retrying enhancement with a simplified summary...".to_string());
        self.enhance(&summary.simplified()).await
    }
}
