//! Turns a summarized story into calm narration paragraphs.
//!
//! The agent remembers the tail of what it has already said so each story
//! flows on from the previous one, and greets the listener only once per
//! session.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::llm::{Prompt, TextGenerator};
use super::{NewsStory, Paragraph};
use crate::config::TranscriptConfig;
use crate::error::TranscriptError;
use crate::text::{limit_words, strip_code_fence};

const MAX_TRANSCRIPT_TOKENS: u32 = 2048;

pub struct TranscriptAgent {
    generator: Arc<dyn TextGenerator>,
    config: TranscriptConfig,
    temperature: f32,
    /// Recently spoken paragraphs, oldest first.
    context: Vec<String>,
    stories_told: usize,
}

impl TranscriptAgent {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        config: TranscriptConfig,
        temperature: f32,
    ) -> Self {
        Self {
            generator,
            config,
            temperature,
            context: Vec::new(),
            stories_told: 0,
        }
    }

    /// Forget everything said so far; the next story opens with a greeting.
    pub fn reset_context(&mut self) {
        self.context.clear();
        self.stories_told = 0;
    }

    /// Generate the paragraphs for one story.
    ///
    /// Context only advances when a usable transcript comes back, so a failed
    /// attempt can be retried with the same framing.
    pub async fn compose(&mut self, story: &NewsStory) -> Result<Vec<Paragraph>, TranscriptError> {
        let prompt = Prompt {
            system: None,
            user: self.build_prompt(story),
            temperature: self.temperature,
            max_tokens: MAX_TRANSCRIPT_TOKENS,
        };
        let reply = self.generator.generate(&prompt).await?;

        let paragraphs: Vec<Paragraph> = parse_paragraphs(&reply)
            .into_iter()
            .flat_map(|p| {
                limit_words(&p.text, self.config.max_words)
                    .into_iter()
                    .map(move |text| Paragraph {
                        text,
                        guidance: p.guidance,
                    })
            })
            .collect();
        if paragraphs.is_empty() {
            return Err(TranscriptError::Empty);
        }

        self.stories_told += 1;
        self.context.extend(paragraphs.iter().map(|p| p.text.clone()));
        let keep = self.config.context_paragraphs;
        if self.context.len() > keep {
            self.context.drain(..self.context.len() - keep);
        }

        debug!(
            "Story '{}' ({}) → {} paragraphs ({} guidance)",
            story.title,
            story.url,
            paragraphs.len(),
            paragraphs.iter().filter(|p| p.guidance).count()
        );
        Ok(paragraphs)
    }

    fn build_prompt(&self, story: &NewsStory) -> String {
        let cfg = &self.config;
        let mut prompt = String::new();

        if self.stories_told == 0 {
            let _ = writeln!(
                prompt,
                "You are opening a calm bedtime news podcast. Begin with a warm greeting such as \
                 'Good evening, welcome to {}, I'm your news anchor {}.' Keep it soothing.",
                cfg.channel_name, cfg.anchor_name
            );
        } else {
            let _ = writeln!(
                prompt,
                "You are continuing a calm bedtime news podcast. Open with a gentle transition \
                 from the previous topic so the stories connect naturally."
            );
        }

        let _ = writeln!(prompt, "\nWrite a soothing transcript with these rules:");
        let _ = writeln!(prompt, "1. Two or three paragraphs about this story:");
        let _ = writeln!(prompt, "   Title: {}", story.title);
        let _ = writeln!(prompt, "   Summary: {}", story.summary);
        if !story.comments.is_empty() {
            let comments = serde_json::to_string_pretty(&story.comments).unwrap_or_default();
            let _ = writeln!(
                prompt,
                "2. If any of these reader comments are short and interesting, add one paragraph \
                 that reads one or two of them in a lightly funny way:\n{comments}"
            );
        }
        let _ = writeln!(
            prompt,
            "3. Each paragraph must not exceed {} words.",
            cfg.max_words
        );
        let _ = writeln!(
            prompt,
            "4. Use a calm, gentle tone. Informative, never alarming or exciting."
        );
        if cfg.sleep_guidance {
            let _ = writeln!(
                prompt,
                "5. Add one paragraph of gentle sleep guidance in between, for example \
                 'while we talk about the news, remember to breathe slowly'. Mark it with \
                 \"guidance\": true."
            );
        }

        let recent = &self.context[self.context.len().saturating_sub(cfg.context_paragraphs)..];
        if !recent.is_empty() {
            let _ = writeln!(prompt, "\nStay consistent with what was just said:");
            for line in recent {
                let _ = writeln!(prompt, "{line}");
            }
        }

        let _ = writeln!(
            prompt,
            "\nThe broadcast keeps going after this story, so never sign off or say goodnight.\n\
             Output ONLY a JSON array, nothing else, in this format:\n\
             [{{\"text\": \"paragraph\", \"guidance\": false}}, ...]"
        );
        prompt
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawParagraph {
    Plain(String),
    Tagged {
        text: String,
        #[serde(default)]
        guidance: bool,
    },
}

/// Parse an LLM reply into paragraphs.
///
/// Accepts a JSON array of strings or `{"text", "guidance"}` objects,
/// optionally wrapped in a code fence. Anything else is split on blank lines.
fn parse_paragraphs(reply: &str) -> Vec<Paragraph> {
    let body = strip_code_fence(reply);
    let parsed: Vec<Paragraph> = match serde_json::from_str::<Vec<RawParagraph>>(body) {
        Ok(items) => items
            .into_iter()
            .map(|item| match item {
                RawParagraph::Plain(text) => Paragraph {
                    text,
                    guidance: false,
                },
                RawParagraph::Tagged { text, guidance } => Paragraph { text, guidance },
            })
            .collect(),
        Err(e) => {
            warn!("Transcript reply is not a JSON array ({e}), splitting on blank lines");
            body.split("\n\n")
                .map(|p| Paragraph {
                    text: p.to_string(),
                    guidance: false,
                })
                .collect()
        }
    };

    parsed
        .into_iter()
        .filter(|p| !p.text.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::LlmError;
    use crate::news::reddit::Comment;

    /// Replies with queued responses and records every prompt.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompt(&self, i: usize) -> String {
            self.prompts.lock().unwrap()[i].clone()
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.user.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    fn story(title: &str) -> NewsStory {
        NewsStory {
            title: title.into(),
            url: format!("https://news.example/{title}"),
            summary: format!("{title} happened today."),
            comments: vec![Comment {
                author: "bob".into(),
                body: "Finally some good news".into(),
            }],
        }
    }

    fn agent(generator: Arc<Scripted>) -> TranscriptAgent {
        let config = TranscriptConfig {
            max_words: 8,
            context_paragraphs: 2,
            ..TranscriptConfig::default()
        };
        TranscriptAgent::new(generator, config, 0.7)
    }

    #[test]
    fn parses_tagged_objects() {
        let reply = r#"[{"text": "Good evening.", "guidance": false}, {"text": "Breathe slowly.", "guidance": true}]"#;
        let paragraphs = parse_paragraphs(reply);
        assert_eq!(paragraphs.len(), 2);
        assert!(!paragraphs[0].guidance);
        assert!(paragraphs[1].guidance);
    }

    #[test]
    fn parses_fenced_string_array() {
        let reply = "```json\n[\"One.\", \"\", \"Two.\"]\n```";
        let texts: Vec<String> = parse_paragraphs(reply).into_iter().map(|p| p.text).collect();
        assert_eq!(texts, vec!["One.", "Two."]);
    }

    #[test]
    fn mixed_array_items_are_accepted() {
        let reply = r#"["Plain one.", {"text": "Rest now."}]"#;
        let paragraphs = parse_paragraphs(reply);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[1].text, "Rest now.");
        assert!(!paragraphs[1].guidance);
    }

    #[test]
    fn non_json_falls_back_to_blank_lines() {
        let reply = "First paragraph here.\n\nSecond paragraph here.\n\n  ";
        let texts: Vec<String> = parse_paragraphs(reply).into_iter().map(|p| p.text).collect();
        assert_eq!(texts, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[tokio::test]
    async fn first_story_greets_and_later_ones_transition() {
        let generator = Scripted::new(vec![
            Ok(r#"["Good evening, welcome."]"#.into()),
            Ok(r#"["Meanwhile, by the lake."]"#.into()),
        ]);
        let mut agent = agent(generator.clone());

        agent.compose(&story("solar")).await.unwrap();
        agent.compose(&story("lake")).await.unwrap();

        let first = generator.prompt(0);
        assert!(first.contains("Sleepy News Channel"));
        assert!(first.contains("anchor Bob"));
        assert!(first.contains("Finally some good news"));
        assert!(first.contains("must not exceed 8 words"));

        let second = generator.prompt(1);
        assert!(second.contains("transition"));
        assert!(!second.contains("anchor Bob"));
        assert!(second.contains("Good evening, welcome."));
        assert_eq!(agent.stories_told, 2);
    }

    #[tokio::test]
    async fn long_paragraphs_are_split_to_the_word_limit() {
        let generator = Scripted::new(vec![Ok(
            r#"[{"text": "The sun rose over quiet hills. Farmers smiled at the new panels today.", "guidance": true}]"#
                .into(),
        )]);
        let mut agent = agent(generator);
        let paragraphs = agent.compose(&story("solar")).await.unwrap();
        assert_eq!(paragraphs.len(), 2);
        assert!(paragraphs.iter().all(|p| p.guidance));
        assert!(paragraphs.iter().all(|p| crate::text::word_count(&p.text) <= 8));
    }

    #[tokio::test]
    async fn failure_leaves_context_untouched() {
        let generator = Scripted::new(vec![
            Err(LlmError::EmptyResponse),
            Ok("[]".into()),
            Ok(r#"["Good evening."]"#.into()),
        ]);
        let mut agent = agent(generator.clone());

        assert!(matches!(
            agent.compose(&story("a")).await,
            Err(TranscriptError::Generation(_))
        ));
        assert!(matches!(agent.compose(&story("a")).await, Err(TranscriptError::Empty)));
        assert_eq!(agent.stories_told, 0);

        agent.compose(&story("a")).await.unwrap();
        assert!(generator.prompt(2).contains("anchor Bob"));
    }

    #[tokio::test]
    async fn context_keeps_only_recent_paragraphs() {
        let generator = Scripted::new(vec![
            Ok(r#"["Alpha.", "Beta.", "Gamma."]"#.into()),
            Ok(r#"["Delta."]"#.into()),
        ]);
        let mut agent = agent(generator.clone());
        agent.compose(&story("a")).await.unwrap();
        agent.compose(&story("b")).await.unwrap();

        let second = generator.prompt(1);
        assert!(!second.contains("Alpha."));
        assert!(second.contains("Beta."));
        assert!(second.contains("Gamma."));
    }

    #[tokio::test]
    async fn reset_restores_the_greeting() {
        let generator = Scripted::new(vec![Ok(r#"["One."]"#.into()), Ok(r#"["Two."]"#.into())]);
        let mut agent = agent(generator.clone());
        agent.compose(&story("a")).await.unwrap();
        agent.reset_context();
        agent.compose(&story("b")).await.unwrap();

        let second = generator.prompt(1);
        assert!(second.contains("anchor Bob"));
        assert!(!second.contains("One."));
    }
}
