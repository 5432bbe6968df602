//! Producer/consumer narration pipeline.
//!
//! The [`Pipeline`] owns the bounded queue, the refill signal and the
//! shutdown token, and hands clones of them to exactly two workers:
//! the producer fills the queue with paragraphs, the consumer speaks them and
//! raises the signal when the queue runs low.

pub mod consumer;
pub mod item;
pub mod producer;
pub mod queue;
pub mod signal;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::error::PipelineError;
use crate::history::NarrationLog;
use crate::news::TranscriptSource;
use crate::speech::{AudioPlayer, SpeechSynthesizer};
use consumer::{Consumer, ConsumerStats};
use item::WorkItem;
use producer::{Producer, ProducerReport, ProducerSettings};
use queue::BoundedQueue;
use signal::RefillSignal;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub capacity: usize,
    pub low_watermark: usize,
    pub voice_id: String,
    pub producer: ProducerSettings,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity: config.pipeline.queue_capacity,
            low_watermark: config.pipeline.low_watermark,
            voice_id: config.tts.voice_id.clone(),
            producer: ProducerSettings {
                batch_produce_count: config.pipeline.batch_produce_count,
                fetch_attempts: config.pipeline.fetch_attempts,
                retry_backoff: Duration::from_secs(config.pipeline.retry_backoff_secs),
                fallback: config.transcript.fallback.clone(),
                farewell: config.transcript.farewell.clone(),
            },
        }
    }
}

/// What happened during one listening session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub producer: ProducerReport,
    pub consumer: ConsumerStats,
    /// Items still queued when the session ended.
    pub unplayed: usize,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stories, {} paragraphs queued, {} played, {} skipped, {} left unplayed",
            self.producer.stories,
            self.producer.paragraphs,
            self.consumer.played,
            self.consumer.synthesis_failures + self.consumer.playback_failures,
            self.unplayed
        )
    }
}

pub struct Pipeline {
    settings: PipelineSettings,
    queue: Arc<BoundedQueue<WorkItem>>,
    signal: RefillSignal,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            queue: Arc::new(BoundedQueue::new(settings.capacity)),
            // Raised so the producer's first cycle runs immediately.
            signal: RefillSignal::new(true),
            shutdown: CancellationToken::new(),
            settings,
        }
    }

    /// Token that stops both workers when cancelled.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run both workers until shutdown, or until every story has been spoken.
    ///
    /// When either worker ends the other is told to stop, so a panic on one
    /// side never leaves the other waiting forever.
    pub async fn run(
        self,
        source: Box<dyn TranscriptSource>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        log: Option<NarrationLog>,
    ) -> Result<SessionSummary, PipelineError> {
        let producer = Producer::new(
            self.queue.clone(),
            self.signal.clone(),
            self.shutdown.clone(),
            self.settings.producer.clone(),
        );
        let consumer = Consumer::new(
            self.queue.clone(),
            self.signal.clone(),
            self.shutdown.clone(),
            synthesizer,
            player,
            self.settings.voice_id.clone(),
            self.settings.low_watermark,
            log,
        );

        info!(
            "Pipeline starting (capacity {}, low watermark {})",
            self.queue.capacity(),
            self.settings.low_watermark
        );
        let producer_task = tokio::spawn(producer.run(source));
        let consumer_task = tokio::spawn(consumer.run());

        let producer_done = {
            let shutdown = self.shutdown.clone();
            async move {
                let result = producer_task.await;
                // A normal producer exit (exhaustion) leaves the consumer to drain.
                if result.is_err() {
                    shutdown.cancel();
                }
                result
            }
        };
        let consumer_done = {
            let shutdown = self.shutdown.clone();
            async move {
                let result = consumer_task.await;
                shutdown.cancel();
                result
            }
        };
        let (producer, consumer) = tokio::join!(producer_done, consumer_done);

        let producer = producer.map_err(|e| panicked("producer", e))?;
        let consumer = consumer.map_err(|e| panicked("consumer", e))?;

        if !self.queue.is_empty() {
            info!("Stopped with {} paragraphs still queued", self.queue.len());
        }
        Ok(SessionSummary {
            producer,
            consumer,
            unplayed: self.queue.len(),
        })
    }
}

fn panicked(worker: &'static str, e: JoinError) -> PipelineError {
    error!("{worker} worker ended abnormally: {e}");
    PipelineError::WorkerPanicked {
        worker,
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::config::TranscriptConfig;
    use crate::error::{PlaybackError, SpeechError, TranscriptError};
    use crate::news::placeholder::PlaceholderSource;
    use crate::news::Paragraph;
    use crate::speech::SpeechAudio;

    struct EchoTts;

    #[async_trait]
    impl SpeechSynthesizer for EchoTts {
        async fn synthesize(
            &self,
            text: &str,
            _voice_id: &str,
        ) -> Result<SpeechAudio, SpeechError> {
            Ok(SpeechAudio {
                bytes: text.as_bytes().to_vec(),
                content_type: "audio/mpeg".into(),
            })
        }
    }

    /// Plays each clip for `length` and records its text.
    struct TimedPlayer {
        length: Duration,
        played: Mutex<Vec<String>>,
        count: AtomicUsize,
    }

    impl TimedPlayer {
        fn new(length: Duration) -> Arc<Self> {
            Arc::new(Self {
                length,
                played: Mutex::new(Vec::new()),
                count: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AudioPlayer for TimedPlayer {
        async fn play(&self, audio: SpeechAudio) -> Result<Duration, PlaybackError> {
            tokio::time::sleep(self.length).await;
            self.played
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&audio.bytes).to_string());
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(self.length)
        }
    }

    fn settings(capacity: usize, low_watermark: usize) -> PipelineSettings {
        let mut config = Config::default();
        config.pipeline.queue_capacity = capacity;
        config.pipeline.low_watermark = low_watermark;
        config.pipeline.retry_backoff_secs = 1;
        PipelineSettings::from_config(&config)
    }

    #[tokio::test(start_paused = true)]
    async fn plays_every_story_then_says_goodnight() {
        let player = TimedPlayer::new(Duration::from_secs(3));
        let pipeline = Pipeline::new(settings(5, 1));
        let source = Box::new(PlaceholderSource::new(&TranscriptConfig::default()));

        let summary = pipeline
            .run(source, Arc::new(EchoTts), player.clone(), None)
            .await
            .unwrap();

        assert!(summary.producer.exhausted);
        assert_eq!(summary.producer.stories, 3);
        assert_eq!(summary.consumer.played, summary.producer.paragraphs);
        assert_eq!(summary.unplayed, 0);

        let played = player.played.lock().unwrap();
        assert!(played[0].starts_with("Good evening"));
        let farewell = TranscriptConfig::default().farewell;
        assert_eq!(played.last(), Some(&farewell));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_session_leaves_items_queued() {
        let player = TimedPlayer::new(Duration::from_secs(10));
        let pipeline = Pipeline::new(settings(10, 1));
        let shutdown = pipeline.shutdown_handle();
        let source = Box::new(PlaceholderSource::new(&TranscriptConfig::default()));

        let run = tokio::spawn(pipeline.run(source, Arc::new(EchoTts), player.clone(), None));
        // Mid-way through the first paragraph.
        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown.cancel();

        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.consumer.played, 1);
        assert_eq!(player.count.load(Ordering::SeqCst), 1);
        assert!(summary.unplayed > 0);
        assert!(!summary.producer.exhausted);
    }

    #[tokio::test]
    async fn producer_panic_is_reported_and_stops_consumer() {
        struct Exploding;

        #[async_trait]
        impl TranscriptSource for Exploding {
            async fn next_transcript(&mut self) -> Result<Option<Vec<Paragraph>>, TranscriptError> {
                panic!("source blew up");
            }
            fn skip_current(&mut self) {}
            fn reset_context(&mut self) {}
        }

        let pipeline = Pipeline::new(settings(5, 1));
        let err = pipeline
            .run(
                Box::new(Exploding),
                Arc::new(EchoTts),
                TimedPlayer::new(Duration::from_millis(1)),
                None,
            )
            .await
            .unwrap_err();

        match err {
            PipelineError::WorkerPanicked { worker, reason } => {
                assert_eq!(worker, "producer");
                assert!(reason.contains("panicked"));
            }
        }
    }

    #[test]
    fn summary_reads_well_in_logs() {
        let summary = SessionSummary {
            producer: ProducerReport {
                stories: 2,
                paragraphs: 7,
                fallbacks: 0,
                exhausted: false,
            },
            consumer: ConsumerStats {
                played: 5,
                synthesis_failures: 1,
                playback_failures: 0,
                refill_requests: 2,
            },
            unplayed: 1,
        };
        assert_eq!(
            summary.to_string(),
            "2 stories, 7 paragraphs queued, 5 played, 1 skipped, 1 left unplayed"
        );
    }
}
