//! Speech output: text → audio through a TTS vendor, audio → speakers.
//!
//! Components:
//! - `elevenlabs`: HTTP client for the ElevenLabs text-to-speech API
//! - `playback`: rodio playback on a dedicated audio thread, with optional
//!   background music that ducks under the narration

pub mod elevenlabs;
pub mod playback;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PlaybackError, SpeechError};

/// Encoded audio as returned by the synthesizer. No format assumptions
/// beyond "something the player can decode".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<SpeechAudio, SpeechError>;
}

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play `audio` to completion and return how long it took.
    async fn play(&self, audio: SpeechAudio) -> Result<Duration, PlaybackError>;
}
