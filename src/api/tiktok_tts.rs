use crate::api::body_snippet;
use crate::timeline::SpeechSynthesizer;
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::seq::SliceRandom;
use reqwest::{Client, Url};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

/// One request may carry at most this many characters.
pub const TEXT_CHAR_LIMIT: usize = 300;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("speech service not available and probably rate limited")]
    ServiceUnavailable,
    #[error("voice {0} does not exist")]
    UnknownVoice(String),
    #[error("voice {0} is unavailable right now")]
    VoiceUnavailable(String),
    #[error("empty text")]
    EmptyText,
    #[error("unexpected speech response: {0}")]
    BadResponse(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Decode(#[from] base64::DecodeError),
}

/// Voice and endpoint choice shared by every sentence of one video.
#[derive(Debug)]
pub struct SynthesisSession {
    pub voice_id: String,
    endpoint_index: AtomicUsize,
}

impl SynthesisSession {
    pub fn new(voice_id: &str) -> Self {
        Self {
            voice_id: voice_id.to_string(),
            endpoint_index: AtomicUsize::new(0),
        }
    }

    pub fn random(voices: &[String]) -> Result<Self> {
        let voice = voices
            .choose(&mut rand::thread_rng())
            .context("no voices configured")?;
        Ok(Self::new(voice))
    }

    pub fn endpoint_index(&self) -> usize {
        self.endpoint_index.load(Ordering::SeqCst)
    }
}

/// Pieces of `word` no longer than `chunk_size` chars each.
fn hard_split(word: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars.chunks(chunk_size.max(1)).map(|c| c.iter().collect()).collect()
}

/// Splits `text` at word boundaries into pieces of at most `chunk_size` chars.
/// A word longer than `chunk_size` is cut mid-word.
pub fn split_string(text: &str, chunk_size: usize) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    let words = text.split_whitespace().flat_map(|w| hard_split(w, chunk_size));
    for word in words {
        let word = word.as_str();
        let word_len = word.chars().count();
        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= chunk_size {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            result.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    result
}

fn extract_audio_base64(raw: &str, voice: &str) -> Result<String, TtsError> {
    let root: Value =
        serde_json::from_str(raw).map_err(|_| TtsError::BadResponse(body_snippet(raw)))?;
    let data = root
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| TtsError::BadResponse(body_snippet(raw)))?;

    if data == "error" {
        return Err(TtsError::VoiceUnavailable(voice.to_string()));
    }

    // one endpoint answers with a data URI
    let payload = match data.split_once("base64,") {
        Some((_, b64)) => b64,
        None => data,
    };
    Ok(payload.to_string())
}

pub struct TikTokTts {
    client: Client,
    endpoints: Vec<String>,
    voices: Vec<String>,
    timeout: Duration,
}

impl TikTokTts {
    pub fn new(client: Client, endpoints: Vec<String>, voices: Vec<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoints,
            voices,
            timeout,
        }
    }

    fn endpoint(&self, index: usize) -> &str {
        &self.endpoints[index % self.endpoints.len()]
    }

    async fn endpoint_online(&self, index: usize) -> bool {
        let Ok(url) = Url::parse(self.endpoint(index)) else {
            return false;
        };
        let origin = url.origin().ascii_serialization();
        match self.client.get(origin).timeout(self.timeout).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(_) => false,
        }
    }

    /// Finds a live endpoint, starting from the session's current one and
    /// rotating on failure. The session remembers where it landed.
    async fn select_endpoint(&self, session: &SynthesisSession) -> Result<usize, TtsError> {
        if self.endpoints.is_empty() {
            return Err(TtsError::ServiceUnavailable);
        }
        let start = session.endpoint_index();
        for step in 0..self.endpoints.len() {
            let index = (start + step) % self.endpoints.len();
            if self.endpoint_online(index).await {
                if index != start {
                    session.endpoint_index.store(index, Ordering::SeqCst);
                    logi(format!("Speech endpoint switched to {}", self.endpoint(index)));
                }
                return Ok(index);
            }
        }
        Err(TtsError::ServiceUnavailable)
    }

    async fn generate_chunk(&self, index: usize, text: &str, voice: &str) -> Result<Vec<u8>, TtsError> {
        let resp = self
            .client
            .post(self.endpoint(index))
            .json(&json!({"text": text, "voice": voice}))
            .timeout(self.timeout)
            .send()
            .await?;
        let raw = resp.text().await?;
        let b64 = extract_audio_base64(&raw, voice)?;
        Ok(STANDARD.decode(b64.trim())?)
    }

    pub async fn synthesize_text(
        &self,
        text: &str,
        session: &SynthesisSession,
    ) -> Result<Vec<u8>, TtsError> {
        let index = self.select_endpoint(session).await?;

        let voice = session.voice_id.as_str();
        if !self.voices.iter().any(|v| v == voice) {
            return Err(TtsError::UnknownVoice(voice.to_string()));
        }
        if text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }

        if text.chars().count() < TEXT_CHAR_LIMIT {
            return self.generate_chunk(index, text, voice).await;
        }

        let pieces = split_string(text, TEXT_CHAR_LIMIT - 1);
        let results = futures::future::join_all(
            pieces
                .iter()
                .map(|piece| self.generate_chunk(index, piece, voice)),
        )
        .await;

        let mut audio = Vec::new();
        for chunk in results {
            audio.extend(chunk?);
        }
        Ok(audio)
    }
}

#[async_trait]
impl SpeechSynthesizer for TikTokTts {
    async fn synthesize(&self, text: &str, session: &SynthesisSession) -> Result<Vec<u8>> {
        match self.synthesize_text(text, session).await {
            Ok(audio) => Ok(audio),
            Err(err) => {
                logw(format!("Speech synthesis failed ({}): {}", session.voice_id, err));
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn voices() -> Vec<String> {
        vec!["en_us_007".to_string(), "en_uk_001".to_string()]
    }

    fn tts(endpoints: Vec<String>) -> TikTokTts {
        TikTokTts::new(Client::new(), endpoints, voices(), Duration::from_secs(5))
    }

    async fn online(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[test]
    fn split_string_respects_chunk_size_and_words() {
        let text = "alpha beta gamma delta epsilon";
        let pieces = split_string(text, 11);
        assert_eq!(pieces, vec!["alpha beta", "gamma delta", "epsilon"]);
        assert!(pieces.iter().all(|p| p.chars().count() <= 11));
        assert_eq!(pieces.join(" "), text);
    }

    #[test]
    fn overlong_word_is_cut_to_chunk_size() {
        let long: String = std::iter::repeat('x').take(650).collect();
        let text = format!("hi {} there", long);
        let pieces = split_string(&text, TEXT_CHAR_LIMIT - 1);
        assert!(pieces.iter().all(|p| p.chars().count() < TEXT_CHAR_LIMIT));
        assert_eq!(pieces.len(), 4);
        assert_eq!(pieces[0], "hi");
        assert_eq!(pieces[1].chars().count(), 299);
        assert_eq!(pieces[3], format!("{} there", "x".repeat(52)));
        assert_eq!(pieces.concat().replace(' ', "").len(), "hi".len() + 650 + "there".len());
    }

    #[test]
    fn data_uri_prefix_is_stripped() {
        let raw = r#"{"data":"data:audio/mpeg;base64,QUJD"}"#;
        assert_eq!(extract_audio_base64(raw, "v").unwrap(), "QUJD");
        let raw = r#"{"success":true,"data":"QUJD","error":null}"#;
        assert_eq!(extract_audio_base64(raw, "v").unwrap(), "QUJD");
    }

    #[test]
    fn error_payload_means_voice_unavailable() {
        let raw = r#"{"success":false,"data":"error"}"#;
        assert!(matches!(
            extract_audio_base64(raw, "v"),
            Err(TtsError::VoiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn short_text_is_one_request() {
        let server = MockServer::start().await;
        online(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/generation"))
            .and(body_partial_json(json!({"text": "Hello there.", "voice": "en_us_007"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": STANDARD.encode(b"MP3")})))
            .expect(1)
            .mount(&server)
            .await;

        let client = tts(vec![format!("{}/api/generation", server.uri())]);
        let session = SynthesisSession::new("en_us_007");
        let audio = client.synthesize_text("Hello there.", &session).await.unwrap();
        assert_eq!(audio, b"MP3");
    }

    #[tokio::test]
    async fn long_text_is_chunked_and_reassembled_in_order() {
        let server = MockServer::start().await;
        online(&server).await;
        let first = "a".repeat(200);
        let second = "b".repeat(150);
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"text": first})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(50))
                    .set_body_json(json!({"data": STANDARD.encode(b"first-")})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"text": second})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": STANDARD.encode(b"second")})))
            .mount(&server)
            .await;

        let client = tts(vec![format!("{}/api/generation", server.uri())]);
        let session = SynthesisSession::new("en_uk_001");
        let audio = client
            .synthesize_text(&format!("{} {}", first, second), &session)
            .await
            .unwrap();
        assert_eq!(audio, b"first-second");
    }

    #[tokio::test]
    async fn unknown_voice_and_empty_text_are_rejected() {
        let server = MockServer::start().await;
        online(&server).await;
        let client = tts(vec![format!("{}/api/generation", server.uri())]);

        let err = client
            .synthesize_text("Hi.", &SynthesisSession::new("robot"))
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::UnknownVoice(_)));

        let err = client
            .synthesize_text("  ", &SynthesisSession::new("en_us_007"))
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::EmptyText));
    }

    #[tokio::test]
    async fn fails_over_to_next_endpoint() {
        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&down)
            .await;
        let up = MockServer::start().await;
        online(&up).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": STANDARD.encode(b"ok")})))
            .mount(&up)
            .await;

        let client = tts(vec![
            format!("{}/api/generation", down.uri()),
            format!("{}/api/tiktok-tts", up.uri()),
        ]);
        let session = SynthesisSession::new("en_us_007");
        assert_eq!(client.synthesize_text("Hi.", &session).await.unwrap(), b"ok");
        assert_eq!(session.endpoint_index(), 1);
    }

    #[tokio::test]
    async fn all_endpoints_down_is_service_unavailable() {
        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&down)
            .await;

        let client = tts(vec![format!("{}/api/generation", down.uri())]);
        let err = client
            .synthesize_text("Hi.", &SynthesisSession::new("en_us_007"))
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::ServiceUnavailable));
    }

    #[test]
    fn random_session_picks_a_configured_voice() {
        let session = SynthesisSession::random(&voices()).unwrap();
        assert!(voices().contains(&session.voice_id));
        assert!(SynthesisSession::random(&[]).is_err());
    }
}
