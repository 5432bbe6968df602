//! Offline transcript source with a few canned stories.
//!
//! Useful for checking audio and the pipeline without an LLM or network.

use async_trait::async_trait;

use super::{Paragraph, TranscriptSource};
use crate::config::TranscriptConfig;
use crate::error::TranscriptError;

const STORIES: &[&[&str]] = &[
    &[
        "Tonight, a small coastal town celebrated the return of its lighthouse keeper, \
         who spent the summer repainting the old tower a soft shade of white.",
        "Neighbours brought tea and biscuits, and the light was switched on at dusk \
         while gulls settled along the harbour wall.",
    ],
    &[
        "In the mountains, volunteers finished a new footpath that winds gently \
         through pine forest towards a quiet alpine lake.",
        "Walkers say the only sound up there is the wind in the branches and the \
         occasional splash of a trout.",
    ],
    &[
        "A public library has started lending telescopes, and the first borrowers \
         report clear views of the moon's grey seas.",
        "The librarians suggest looking up slowly and letting your eyes adjust to \
         the darkness, one calm breath at a time.",
    ],
];

const GUIDANCE: &str = "While we talk about the news, let your shoulders soften \
    and breathe in slowly, then out even more slowly.";

pub struct PlaceholderSource {
    greeting: String,
    next: usize,
}

impl PlaceholderSource {
    pub fn new(config: &TranscriptConfig) -> Self {
        Self {
            greeting: format!(
                "Good evening, welcome to {}. I'm your news anchor {}, and here are tonight's quiet stories.",
                config.channel_name, config.anchor_name
            ),
            next: 0,
        }
    }
}

#[async_trait]
impl TranscriptSource for PlaceholderSource {
    async fn next_transcript(&mut self) -> Result<Option<Vec<Paragraph>>, TranscriptError> {
        let Some(story) = STORIES.get(self.next) else {
            return Ok(None);
        };

        let mut paragraphs = Vec::with_capacity(story.len() + 2);
        if self.next == 0 {
            paragraphs.push(Paragraph::news(self.greeting.clone()));
        }
        paragraphs.extend(story.iter().map(|text| Paragraph::news(*text)));
        if self.next == 1 {
            paragraphs.push(Paragraph {
                text: GUIDANCE.into(),
                guidance: true,
            });
        }

        self.next += 1;
        Ok(Some(paragraphs))
    }

    fn skip_current(&mut self) {
        self.next += 1;
    }

    fn reset_context(&mut self) {
        self.next = 0;
    }
}
