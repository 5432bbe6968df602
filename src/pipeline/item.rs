//! One unit of narration.

use std::fmt;

/// A paragraph waiting to be spoken. Owned by the queue once enqueued and
/// handed by value to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Enqueue order, starting at 1.
    pub seq: u64,
    /// 1-based index of the story this paragraph belongs to (0 for
    /// fallback/farewell lines that belong to no story).
    pub story: usize,
    pub text: String,
    /// First paragraph of the first story.
    pub opening: bool,
    /// Sleep/breathing guidance rather than news content.
    pub guidance: bool,
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} (story {})", self.seq, self.story)
    }
}
