//! Where narration comes from.
//!
//! A [`TranscriptSource`] hands the producer one story's worth of paragraphs
//! at a time. The live source lists top Reddit posts, summarizes the linked
//! articles and asks an LLM to retell each story in a calm voice.

pub mod agent;
pub mod llm;
pub mod placeholder;
pub mod reddit;
pub mod summarizer;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{Config, Credentials, NewsSourceKind};
use crate::error::TranscriptError;
use agent::TranscriptAgent;
use placeholder::PlaceholderSource;
use reddit::{Comment, RedditClient, RedditPost};
use summarizer::ArticleSummarizer;

/// One spoken paragraph, before it is numbered and queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub text: String,
    /// Sleep guidance rather than news.
    pub guidance: bool,
}

impl Paragraph {
    pub fn news(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            guidance: false,
        }
    }
}

/// A story ready for the transcript agent.
#[derive(Debug, Clone)]
pub struct NewsStory {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub comments: Vec<Comment>,
}

#[async_trait]
pub trait TranscriptSource: Send {
    /// Paragraphs for the next story, or `None` once every story is told.
    ///
    /// An error leaves the source on the same story so the call can be retried.
    async fn next_transcript(&mut self) -> Result<Option<Vec<Paragraph>>, TranscriptError>;

    /// Give up on the current story and move to the next one.
    fn skip_current(&mut self);

    /// Start a fresh session: forget prior narration so the next story opens
    /// with a greeting.
    fn reset_context(&mut self);
}

/// Build the source selected by `news.source`.
pub fn build_source(
    config: &Config,
    credentials: &Credentials,
) -> Result<Box<dyn TranscriptSource>, TranscriptError> {
    match config.news.source {
        NewsSourceKind::Placeholder => {
            info!("Using placeholder stories");
            Ok(Box::new(PlaceholderSource::new(&config.transcript)))
        }
        NewsSourceKind::Reddit => {
            let generator =
                llm::build_generator(&config.llm, credentials.gemini_api_key.as_deref())?;
            let reddit = RedditClient::new(&config.news)?;
            let summarizer = ArticleSummarizer::new(generator.clone())?;
            let agent = TranscriptAgent::new(
                generator,
                config.transcript.clone(),
                config.llm.temperature,
            );
            info!(
                "Using r/{} top posts ({}), {:?} model '{}'",
                config.news.subreddit, config.news.timeframe, config.llm.provider, config.llm.model
            );
            Ok(Box::new(NewsTranscriptSource::new(
                reddit,
                summarizer,
                agent,
                config.news.max_workers,
            )))
        }
    }
}

/// Live news: Reddit listing → article summaries → agent transcript.
pub struct NewsTranscriptSource {
    reddit: RedditClient,
    summarizer: Arc<ArticleSummarizer>,
    agent: TranscriptAgent,
    max_workers: usize,
    /// Loaded on first use.
    stories: Option<Vec<NewsStory>>,
    cursor: usize,
}

impl NewsTranscriptSource {
    pub fn new(
        reddit: RedditClient,
        summarizer: ArticleSummarizer,
        agent: TranscriptAgent,
        max_workers: usize,
    ) -> Self {
        Self {
            reddit,
            summarizer: Arc::new(summarizer),
            agent,
            max_workers: max_workers.max(1),
            stories: None,
            cursor: 0,
        }
    }

    /// List posts and summarize their articles, at most `max_workers` at a
    /// time. Order follows the listing; posts whose article can't be
    /// summarized are dropped.
    async fn load_stories(&self) -> Result<Vec<NewsStory>, TranscriptError> {
        let posts = self.reddit.top_posts().await?;
        info!(
            "Fetched {} posts from r/{}, summarizing with {} workers",
            posts.len(),
            self.reddit.subreddit(),
            self.max_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        for (index, post) in posts.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let reddit = self.reddit.clone();
            let summarizer = self.summarizer.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                prepare_story(&reddit, &summarizer, post)
                    .await
                    .map(|story| (index, story))
            });
        }

        let mut ready: Vec<(usize, NewsStory)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(entry)) => ready.push(entry),
                Ok(None) => {}
                Err(e) => warn!("Story task failed: {e}"),
            }
        }
        ready.sort_by_key(|(index, _)| *index);

        let stories: Vec<NewsStory> = ready.into_iter().map(|(_, story)| story).collect();
        info!("{} stories ready", stories.len());
        Ok(stories)
    }
}

async fn prepare_story(
    reddit: &RedditClient,
    summarizer: &ArticleSummarizer,
    post: RedditPost,
) -> Option<NewsStory> {
    let summary = match summarizer.summarize(&post.url).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("Skipping '{}': {e}", post.title);
            return None;
        }
    };
    debug!(
        "'{}' by {} ({} points, {} comments)",
        post.title, post.author, post.score, post.num_comments
    );
    let comments = reddit.top_comments(&post.id).await.unwrap_or_else(|e| {
        warn!("No comments for '{}': {e}", post.title);
        Vec::new()
    });

    Some(NewsStory {
        title: post.title,
        url: post.url,
        summary,
        comments,
    })
}

#[async_trait]
impl TranscriptSource for NewsTranscriptSource {
    async fn next_transcript(&mut self) -> Result<Option<Vec<Paragraph>>, TranscriptError> {
        if self.stories.is_none() {
            self.stories = Some(self.load_stories().await?);
        }
        let Some(stories) = &self.stories else {
            return Ok(None);
        };
        let Some(story) = stories.get(self.cursor) else {
            return Ok(None);
        };

        info!(
            "Narrating story {}/{}: {}",
            self.cursor + 1,
            stories.len(),
            story.title
        );
        let paragraphs = self.agent.compose(story).await?;
        self.cursor += 1;
        Ok(Some(paragraphs))
    }

    fn skip_current(&mut self) {
        self.cursor += 1;
    }

    fn reset_context(&mut self) {
        self.agent.reset_context();
    }
}
