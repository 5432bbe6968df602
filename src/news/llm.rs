//! LLM text generation backends.
//!
//! Two interchangeable backends behind [`TextGenerator`]:
//! - Ollama's `/api/generate` for a local model
//! - Gemini's `generateContent` REST endpoint

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::LlmError;

/// One generation request.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError>;
}

/// Build the backend selected in config.
pub fn build_generator(
    config: &LlmConfig,
    gemini_api_key: Option<&str>,
) -> Result<Arc<dyn TextGenerator>, LlmError> {
    match config.provider {
        LlmProvider::Ollama => Ok(Arc::new(OllamaGenerator::new(config)?)),
        LlmProvider::Gemini => {
            let key = gemini_api_key.ok_or(LlmError::MissingApiKey)?;
            Ok(Arc::new(GeminiGenerator::new(config, key)?))
        }
    }
}

fn http_client(config: &LlmConfig) -> Result<Client, LlmError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::Status {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

pub struct OllamaGenerator {
    model: String,
    host: String,
    client: Client,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            model: config.model.clone(),
            host: config.resolved_host().to_string(),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let t_start = Instant::now();
        let mut body = json!({
            "model": self.model,
            "prompt": prompt.user,
            "stream": false,
            "options": {
                "temperature": prompt.temperature,
                "num_predict": prompt.max_tokens
            }
        });
        if let Some(system) = &prompt.system {
            body["system"] = json!(system);
        }

        let url = format!("{}/api/generate", self.host);
        let resp = self.client.post(&url).json(&body).send().await?;
        let data: serde_json::Value = error_for_status(resp).await?.json().await?;

        let result = data["response"].as_str().unwrap_or("").trim().to_string();
        if result.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        debug!(
            "Ollama '{}' produced {} chars ({:.0}ms)",
            self.model,
            result.len(),
            t_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }
}

pub struct GeminiGenerator {
    model: String,
    host: String,
    api_key: String,
    client: Client,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

impl GeminiGenerator {
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, LlmError> {
        Ok(Self {
            model: config.model.clone(),
            host: config.resolved_host().to_string(),
            api_key: api_key.to_string(),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let t_start = Instant::now();
        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt.user }] }],
            "generationConfig": {
                "temperature": prompt.temperature,
                "maxOutputTokens": prompt.max_tokens
            }
        });
        if let Some(system) = &prompt.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let url = format!("{}/models/{}:generateContent", self.host, self.model);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let data: GeminiResponse = error_for_status(resp)
            .await?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;

        let candidate = data
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Malformed("no candidates".into()))?;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        debug!(
            "Gemini '{}' produced {} chars ({:.0}ms)",
            self.model,
            text.len(),
            t_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(text)
    }
}
