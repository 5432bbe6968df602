//! ElevenLabs text-to-speech client.
//!
//! `POST {base}/text-to-speech/{voice_id}` with the API key in `xi-api-key`.
//! Each request is bounded by the client timeout; failed attempts are retried
//! a fixed number of times with a pause in between.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use super::{SpeechAudio, SpeechSynthesizer};
use crate::config::TtsConfig;
use crate::error::SpeechError;

const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    output_format: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ElevenLabsClient {
    /// `model_override` (from `ELEVENLABS_MODEL_ID`) wins over `config.model_id`.
    pub fn new(
        config: &TtsConfig,
        api_key: String,
        model_override: Option<String>,
    ) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model_id: model_override.unwrap_or_else(|| config.model_id.clone()),
            output_format: config.output_format.clone(),
            max_retries: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    async fn request_once(&self, text: &str, voice_id: &str) -> Result<SpeechAudio, SpeechError> {
        let url = format!("{}/text-to-speech/{voice_id}", self.base_url);
        let body = json!({
            "text": text,
            "model_id": self.model_id,
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("output_format", self.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .header("accept", DEFAULT_CONTENT_TYPE)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(SpeechError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }

        Ok(SpeechAudio {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<SpeechAudio, SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let mut last_err = SpeechError::EmptyAudio;
        for attempt in 1..=self.max_retries {
            match self.request_once(text, voice_id).await {
                Ok(audio) => {
                    debug!(
                        "Synthesized {} chars → {} bytes of {}",
                        text.len(),
                        audio.bytes.len(),
                        audio.content_type
                    );
                    return Ok(audio);
                }
                Err(e) => {
                    warn!(
                        "ElevenLabs TTS attempt {attempt}/{} failed: {e}",
                        self.max_retries
                    );
                    last_err = e;
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;

    use crate::test_support::serve;

    #[derive(Clone, Default)]
    struct Fake {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
    }

    async fn tts_handler(
        State(fake): State<Fake>,
        Path(voice): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, Vec<u8>) {
        let n = fake.calls.fetch_add(1, Ordering::SeqCst);
        if n < fake.fail_first {
            return (StatusCode::SERVICE_UNAVAILABLE, b"busy".to_vec());
        }
        assert_eq!(voice, "voice-1");
        assert_eq!(query.get("output_format").map(String::as_str), Some("mp3_44100_128"));
        assert_eq!(headers["xi-api-key"], "key-1");
        assert_eq!(body["model_id"], "model-x");
        let text = body["text"].as_str().unwrap_or_default();
        (StatusCode::OK, format!("AUDIO:{text}").into_bytes())
    }

    async fn client_for(fake: Fake, max_retries: u32) -> ElevenLabsClient {
        let app = Router::new()
            .route("/text-to-speech/{voice}", post(tts_handler))
            .with_state(fake);
        let base_url = serve(app).await;
        let config = TtsConfig {
            base_url,
            model_id: "model-x".into(),
            max_retries,
            retry_backoff_ms: 1,
            ..TtsConfig::default()
        };
        ElevenLabsClient::new(&config, "key-1".into(), None).unwrap()
    }

    #[tokio::test]
    async fn returns_audio_bytes() {
        let client = client_for(Fake::default(), 2).await;
        let audio = client.synthesize("Good evening", "voice-1").await.unwrap();
        assert_eq!(audio.bytes, b"AUDIO:Good evening");
    }

    #[tokio::test]
    async fn retries_after_server_error() {
        let fake = Fake {
            fail_first: 1,
            ..Fake::default()
        };
        let calls = fake.calls.clone();
        let client = client_for(fake, 2).await;
        let audio = client.synthesize("Breathe slowly", "voice-1").await.unwrap();
        assert_eq!(audio.bytes, b"AUDIO:Breathe slowly");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let fake = Fake {
            fail_first: 10,
            ..Fake::default()
        };
        let calls = fake.calls.clone();
        let client = client_for(fake, 2).await;
        let err = client.synthesize("Hello", "voice-1").await.unwrap_err();
        assert!(matches!(err, SpeechError::Status { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_request() {
        let fake = Fake::default();
        let calls = fake.calls.clone();
        let client = client_for(fake, 2).await;
        let err = client.synthesize("   ", "voice-1").await.unwrap_err();
        assert!(matches!(err, SpeechError::EmptyText));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn model_override_wins() {
        let client =
            ElevenLabsClient::new(&TtsConfig::default(), "k".into(), Some("eleven_turbo_v2".into()))
                .unwrap();
        assert_eq!(client.model_id, "eleven_turbo_v2");
    }
}
