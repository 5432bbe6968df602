//! Consumer worker.
//!
//! WAITING_FOR_ITEM → SYNTHESIZING → PLAYING → CHECK_WATERMARK → WAITING_FOR_ITEM
//!
//! Playback is never interrupted. A shutdown request is honoured at every
//! other state boundary.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::item::WorkItem;
use super::queue::BoundedQueue;
use super::signal::RefillSignal;
use crate::history::{NarrationLog, NarrationRecord, Outcome};
use crate::speech::{AudioPlayer, SpeechSynthesizer};
use crate::text::{preview, LOG_PREVIEW_CHARS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    WaitingForItem,
    Synthesizing,
    Playing,
    CheckWatermark,
    Stopped,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForItem => write!(f, "WAITING_FOR_ITEM"),
            Self::Synthesizing => write!(f, "SYNTHESIZING"),
            Self::Playing => write!(f, "PLAYING"),
            Self::CheckWatermark => write!(f, "CHECK_WATERMARK"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Items whose playback completed. Only these count as consumed.
    pub played: usize,
    pub synthesis_failures: usize,
    pub playback_failures: usize,
    /// Times the refill signal went from clear to raised.
    pub refill_requests: usize,
}

pub struct Consumer {
    queue: Arc<BoundedQueue<WorkItem>>,
    signal: RefillSignal,
    shutdown: CancellationToken,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    voice_id: String,
    low_watermark: usize,
    log: Option<NarrationLog>,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl Consumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<BoundedQueue<WorkItem>>,
        signal: RefillSignal,
        shutdown: CancellationToken,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        voice_id: String,
        low_watermark: usize,
        log: Option<NarrationLog>,
    ) -> Self {
        Self {
            queue,
            signal,
            shutdown,
            synthesizer,
            player,
            voice_id,
            low_watermark,
            log,
            state: ConsumerState::WaitingForItem,
            stats: ConsumerStats::default(),
        }
    }

    fn transition(&mut self, next: ConsumerState) {
        if self.state != next {
            debug!("Consumer: {} → {}", self.state, next);
            self.state = next;
        }
    }

    /// Run until shutdown, or until the queue is sealed and drained.
    pub async fn run(mut self) -> ConsumerStats {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.transition(ConsumerState::WaitingForItem);
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                item = self.queue.pop() => item,
            };
            let Some(item) = next else {
                info!("Queue sealed and drained");
                break;
            };

            if item.opening {
                info!("Starting tonight's broadcast");
            }
            self.transition(ConsumerState::Synthesizing);
            debug!("Synthesizing {item}: {}", preview(&item.text, LOG_PREVIEW_CHARS));
            let started = Instant::now();
            let synthesized = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                audio = self.synthesizer.synthesize(&item.text, &self.voice_id) => audio,
            };
            let synthesis_ms = millis(started.elapsed());

            let (outcome, playback_ms) = match synthesized {
                Err(e) => {
                    warn!("TTS failed for {item}, skipping: {e}");
                    self.stats.synthesis_failures += 1;
                    (Outcome::SynthesisFailed, 0)
                }
                Ok(audio) => {
                    if self.shutdown.is_cancelled() {
                        debug!("Shutdown requested, discarding audio for {item}");
                        break;
                    }

                    self.transition(ConsumerState::Playing);
                    match self.player.play(audio).await {
                        Ok(played_for) => {
                            self.stats.played += 1;
                            info!("Played {item} ({:.1}s)", played_for.as_secs_f64());
                            (Outcome::Played, millis(played_for))
                        }
                        Err(e) => {
                            warn!("Playback failed for {item}, dropping: {e}");
                            self.stats.playback_failures += 1;
                            (Outcome::PlaybackFailed, 0)
                        }
                    }
                }
            };

            if let Some(log) = &self.log {
                log.append(&NarrationRecord::new(
                    &item,
                    outcome,
                    synthesis_ms,
                    playback_ms,
                    &self.voice_id,
                ));
            }

            self.transition(ConsumerState::CheckWatermark);
            let remaining = self.queue.len();
            if remaining <= self.low_watermark && self.signal.raise() {
                self.stats.refill_requests += 1;
                debug!(
                    "Queue at {remaining} (low watermark {}), requesting refill",
                    self.low_watermark
                );
            }
        }

        self.transition(ConsumerState::Stopped);
        info!(
            "Consumer stopped: {} played, {} TTS failures, {} playback failures, {} refills requested",
            self.stats.played,
            self.stats.synthesis_failures,
            self.stats.playback_failures,
            self.stats.refill_requests
        );
        self.stats
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
