//! Narration history.
//!
//! One JSON line per processed paragraph in `{dir}/{date}-narration.jsonl`,
//! by default under `~/.sleepy-news-history`.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pipeline::item::WorkItem;
use crate::text::word_count;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Played,
    SynthesisFailed,
    PlaybackFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationRecord {
    pub timestamp: String,
    pub seq: u64,
    pub story: usize,
    pub chars: usize,
    pub words: usize,
    pub guidance: bool,
    pub outcome: Outcome,
    pub synthesis_ms: i64,
    pub playback_ms: i64,
    pub voice: String,
}

impl NarrationRecord {
    pub fn new(
        item: &WorkItem,
        outcome: Outcome,
        synthesis_ms: i64,
        playback_ms: i64,
        voice: &str,
    ) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            seq: item.seq,
            story: item.story,
            chars: item.text.chars().count(),
            words: word_count(&item.text),
            guidance: item.guidance,
            outcome,
            synthesis_ms,
            playback_ms,
            voice: voice.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NarrationLog {
    dir: PathBuf,
}

impl NarrationLog {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// `~/.sleepy-news-history`, or `None` without a home directory.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".sleepy-news-history"))
    }

    fn file_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{date}-narration.jsonl"))
    }

    /// Append a record to today's file. Failures are logged, never returned.
    pub fn append(&self, record: &NarrationRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("Failed to create history dir {}: {e}", self.dir.display());
            return;
        }

        let date = Local::now().format("%Y-%m-%d").to_string();
        let path = self.file_for(&date);
        let mut file = match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Failed to open history file {}: {e}", path.display());
                return;
            }
        };

        match serde_json::to_string(record) {
            Ok(line) => {
                if let Err(e) = writeln!(file, "{line}") {
                    warn!("Failed to write history record: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize history record: {e}"),
        }
    }

    #[cfg(test)]
    pub fn load(&self, date: &str) -> Vec<NarrationRecord> {
        fs::read_to_string(self.file_for(date))
            .map(|contents| {
                contents
                    .lines()
                    .filter_map(|line| serde_json::from_str(line).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn today(&self) -> Vec<NarrationRecord> {
        self.load(&Local::now().format("%Y-%m-%d").to_string())
    }
}
