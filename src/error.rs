//! Error types for sleepy-news-rs.
//!
//! One enum per subsystem. Only [`ConfigError`] is fatal; everything else is
//! recovered inside the worker that hit it.

use std::path::PathBuf;

/// Startup configuration problems. Reported before any worker starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is required. Set it in your environment or .env file")]
    MissingCredential { name: &'static str },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

/// Bounded work queue errors.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The producer sealed the queue; no further items are accepted.
    #[error("Queue is sealed")]
    Sealed,
}

/// LLM backend errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("Unexpected LLM response shape: {0}")]
    Malformed(String),
}

/// News ingestion errors (story listing and article summaries).
#[derive(Debug, thiserror::Error)]
pub enum NewsError {
    #[error("HTTP request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("No text content found at {0}")]
    EmptyPage(String),

    #[error("Summary failed: {0}")]
    Summary(#[from] LlmError),
}

/// Transcript generation errors. All are transient from the producer's view.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("News fetch failed: {0}")]
    News(#[from] NewsError),

    #[error("Transcript generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Transcript contained no paragraphs")]
    Empty,
}

/// Text-to-speech errors. The consumer skips the item on any of these.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Text must be non-empty")]
    EmptyText,

    #[error("TTS request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("TTS returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("TTS returned no audio")]
    EmptyAudio,
}

/// Audio output errors. The item is dropped on any of these.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Failed to open audio output: {0}")]
    Output(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Audio thread is gone")]
    ThreadGone,
}

/// Coordinator errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{worker} worker panicked: {reason}")]
    WorkerPanicked { worker: &'static str, reason: String },
}
