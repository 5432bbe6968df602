//! Top posts and their top comments from a subreddit, via Reddit's public
//! JSON listings.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NewsConfig;
use crate::error::NewsError;

const REDDIT_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub score: i64,
    pub num_comments: u64,
    pub url: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
}

// --- Listing JSON ---

#[derive(Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Deserialize)]
struct ListingData<T> {
    #[serde(default = "Vec::new")]
    children: Vec<Thing<T>>,
}

#[derive(Deserialize)]
struct Thing<T> {
    kind: String,
    data: T,
}

#[derive(Deserialize)]
struct PostData {
    id: String,
    title: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    url: Option<String>,
    author: Option<String>,
    #[serde(default)]
    stickied: bool,
}

#[derive(Deserialize)]
struct CommentData {
    author: Option<String>,
    body: Option<String>,
    #[serde(default)]
    stickied: bool,
}

#[derive(Clone)]
pub struct RedditClient {
    client: Client,
    base_url: String,
    subreddit: String,
    timeframe: String,
    limit: usize,
    comment_limit: usize,
}

impl RedditClient {
    pub fn new(config: &NewsConfig) -> Result<Self, NewsError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|source| NewsError::Http {
                url: REDDIT_BASE.into(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: REDDIT_BASE.into(),
            subreddit: config.subreddit.clone(),
            timeframe: config.timeframe.clone(),
            limit: config.limit,
            comment_limit: config.comment_limit,
        })
    }

    /// Point the client at another host (a local fake in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn subreddit(&self) -> &str {
        &self.subreddit
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, NewsError> {
        let http = |source| NewsError::Http {
            url: url.to_string(),
            source,
        };
        let resp = self.client.get(url).query(query).send().await.map_err(http)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NewsError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.json().await.map_err(http)
    }

    /// Top posts for the configured timeframe, in ranking order. Stickied
    /// posts and posts without a link are skipped.
    pub async fn top_posts(&self) -> Result<Vec<RedditPost>, NewsError> {
        let url = format!("{}/r/{}/top.json", self.base_url, self.subreddit);
        let listing: Listing<PostData> = self
            .get_json(
                &url,
                &[("t", self.timeframe.clone()), ("limit", self.limit.to_string())],
            )
            .await?;

        let posts: Vec<RedditPost> = listing
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t3")
            .map(|thing| thing.data)
            .filter(|post| !post.stickied)
            .filter_map(|post| {
                let url = post.url.filter(|u| !u.is_empty())?;
                Some(RedditPost {
                    id: post.id,
                    title: post.title,
                    score: post.score,
                    num_comments: post.num_comments,
                    url,
                    author: post.author.unwrap_or_else(|| "[deleted]".into()),
                })
            })
            .take(self.limit)
            .collect();

        debug!("r/{}: {} posts", self.subreddit, posts.len());
        Ok(posts)
    }

    /// Top-level comments of a post sorted by score. Stickied (moderator)
    /// and deleted comments are skipped.
    pub async fn top_comments(&self, post_id: &str) -> Result<Vec<Comment>, NewsError> {
        if self.comment_limit == 0 {
            return Ok(Vec::new());
        }
        let url = format!("{}/comments/{post_id}.json", self.base_url);
        // [post listing, comment listing]; comment children mix "t1" comments
        // with "more" stubs of a different shape.
        let listings: Vec<Listing<serde_json::Value>> = self
            .get_json(
                &url,
                &[
                    ("sort", "top".to_string()),
                    ("limit", self.comment_limit.to_string()),
                    ("depth", "1".to_string()),
                ],
            )
            .await?;

        let comments = listings
            .into_iter()
            .nth(1)
            .map(|listing| listing.data.children)
            .unwrap_or_default()
            .into_iter()
            .filter(|thing| thing.kind == "t1")
            .filter_map(|thing| serde_json::from_value::<CommentData>(thing.data).ok())
            .filter(|c| !c.stickied)
            .filter_map(|c| {
                let author = c.author.filter(|a| a != "[deleted]")?;
                let body = c.body.filter(|b| !b.trim().is_empty() && b != "[removed]")?;
                Some(Comment { author, body })
            })
            .take(self.comment_limit)
            .collect();

        Ok(comments)
    }
}
