//! Producer worker.
//!
//! WAITING_FOR_SIGNAL → FETCHING → ENQUEUING → WAITING_FOR_SIGNAL

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::item::WorkItem;
use super::queue::BoundedQueue;
use super::signal::RefillSignal;
use crate::news::{Paragraph, TranscriptSource};
use crate::text::{preview, LOG_PREVIEW_CHARS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    WaitingForSignal,
    Fetching,
    Enqueuing,
    Stopped,
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForSignal => write!(f, "WAITING_FOR_SIGNAL"),
            Self::Fetching => write!(f, "FETCHING"),
            Self::Enqueuing => write!(f, "ENQUEUING"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// Transcripts fetched per wakeup.
    pub batch_produce_count: usize,
    /// Attempts per transcript before falling back.
    pub fetch_attempts: u32,
    pub retry_backoff: Duration,
    /// Spoken in place of a story that could not be fetched.
    pub fallback: String,
    /// Spoken once every story has been told.
    pub farewell: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub stories: usize,
    pub paragraphs: usize,
    pub fallbacks: usize,
    /// The source ran out of stories and the queue was sealed.
    pub exhausted: bool,
}

enum Fetched {
    Story(Vec<Paragraph>),
    Failed,
    Exhausted,
}

pub struct Producer {
    queue: Arc<BoundedQueue<WorkItem>>,
    signal: RefillSignal,
    shutdown: CancellationToken,
    settings: ProducerSettings,
    state: ProducerState,
    next_seq: u64,
    /// The first story paragraph has been queued.
    opened: bool,
    /// Whether this wakeup has already cleared the signal.
    cleared: bool,
    report: ProducerReport,
}

impl Producer {
    pub fn new(
        queue: Arc<BoundedQueue<WorkItem>>,
        signal: RefillSignal,
        shutdown: CancellationToken,
        settings: ProducerSettings,
    ) -> Self {
        Self {
            queue,
            signal,
            shutdown,
            settings,
            state: ProducerState::WaitingForSignal,
            next_seq: 1,
            opened: false,
            cleared: false,
            report: ProducerReport::default(),
        }
    }

    fn transition(&mut self, next: ProducerState) {
        if self.state != next {
            debug!("Producer: {} → {}", self.state, next);
            self.state = next;
        }
    }

    /// Run until shutdown or until the source is exhausted.
    pub async fn run(mut self, mut source: Box<dyn TranscriptSource>) -> ProducerReport {
        source.reset_context();

        'session: loop {
            self.transition(ProducerState::WaitingForSignal);
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break 'session,
                _ = self.signal.wait() => {}
            }
            self.cleared = false;

            for _ in 0..self.settings.batch_produce_count {
                self.transition(ProducerState::Fetching);
                let Some(fetched) = self.fetch(source.as_mut()).await else {
                    break 'session;
                };

                self.transition(ProducerState::Enqueuing);
                match fetched {
                    Fetched::Story(paragraphs) => {
                        self.report.stories += 1;
                        let story = self.report.stories;
                        info!("Story {story}: {} paragraphs", paragraphs.len());
                        for paragraph in paragraphs {
                            if !self.enqueue(story, paragraph).await {
                                break 'session;
                            }
                        }
                    }
                    Fetched::Failed => {
                        warn!(
                            "Giving up on story after {} attempts, narrating fallback",
                            self.settings.fetch_attempts
                        );
                        source.skip_current();
                        self.report.fallbacks += 1;
                        let fallback = Paragraph::news(self.settings.fallback.clone());
                        if !self.enqueue(0, fallback).await {
                            break 'session;
                        }
                    }
                    Fetched::Exhausted => {
                        info!("No more stories, narrating farewell");
                        let farewell = Paragraph::news(self.settings.farewell.clone());
                        self.enqueue(0, farewell).await;
                        self.queue.seal();
                        self.report.exhausted = true;
                        break 'session;
                    }
                }
            }
        }

        self.transition(ProducerState::Stopped);
        info!(
            "Producer stopped: {} stories, {} paragraphs, {} fallbacks",
            self.report.stories, self.report.paragraphs, self.report.fallbacks
        );
        self.report
    }

    /// Fetch one transcript with retries. `None` means shutdown was requested.
    async fn fetch(&self, source: &mut dyn TranscriptSource) -> Option<Fetched> {
        let attempts = self.settings.fetch_attempts.max(1);

        for attempt in 1..=attempts {
            let result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                result = source.next_transcript() => result,
            };

            match result {
                Ok(None) => return Some(Fetched::Exhausted),
                Ok(Some(paragraphs)) if !paragraphs.is_empty() => {
                    return Some(Fetched::Story(paragraphs))
                }
                Ok(Some(_)) => warn!("Transcript attempt {attempt}/{attempts} came back empty"),
                Err(e) => warn!("Transcript attempt {attempt}/{attempts} failed: {e}"),
            }

            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return None,
                    _ = tokio::time::sleep(self.settings.retry_backoff) => {}
                }
            }
        }

        Some(Fetched::Failed)
    }

    /// Push one paragraph; `story` 0 marks fallback and farewell lines.
    /// Returns `false` if shutdown was requested or the queue no longer
    /// accepts items.
    async fn enqueue(&mut self, story: usize, paragraph: Paragraph) -> bool {
        // Cleared just before the cycle's first push, so any low-queue check
        // after that item is popped can raise it again.
        if !self.cleared {
            self.signal.clear();
            self.cleared = true;
        }

        let item = WorkItem {
            seq: self.next_seq,
            story,
            text: paragraph.text,
            opening: story > 0 && !self.opened,
            guidance: paragraph.guidance,
        };
        let label = item.to_string();
        let text_preview = preview(&item.text, LOG_PREVIEW_CHARS);

        let pushed = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return false,
            pushed = self.queue.push(item) => pushed,
        };
        if let Err(e) = pushed {
            warn!("Dropping {label}: {e}");
            return false;
        }

        debug!("Enqueued {label}: {text_preview}");
        self.opened |= story > 0;
        self.next_seq += 1;
        self.report.paragraphs += 1;
        true
    }
}
