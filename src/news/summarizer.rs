//! Article page → short plain-language summary.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use tracing::debug;

use super::llm::{Prompt, TextGenerator};
use crate::error::NewsError;
use crate::text::{html_to_text, truncate_chars};

/// Page text beyond this is not sent to the model.
const MAX_PAGE_CHARS: usize = 20_000;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const EXTRACTOR_PROMPT: &str = "You are an expert news article extractor. The text below was \
    scraped from a news webpage. Return a summary of the news article only: drop \
    advertisements, navigation links, related-article sections, comments and author bios. \
    Include the headline. The summary must be no more than 200 words.";

pub struct ArticleSummarizer {
    client: Client,
    generator: Arc<dyn TextGenerator>,
}

impl ArticleSummarizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Result<Self, NewsError> {
        // Some news sites answer 403 to non-browser clients.
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(BROWSER_UA)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| NewsError::Http {
                url: String::new(),
                source,
            })?;

        Ok(Self { client, generator })
    }

    async fn fetch_text(&self, url: &str) -> Result<String, NewsError> {
        let http = |source| NewsError::Http {
            url: url.to_string(),
            source,
        };
        let resp = self.client.get(url).send().await.map_err(http)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NewsError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let html = resp.text().await.map_err(http)?;

        let text = html_to_text(&html);
        if text.is_empty() {
            return Err(NewsError::EmptyPage(url.to_string()));
        }
        Ok(text)
    }

    /// Download `url` and condense it to a short summary.
    pub async fn summarize(&self, url: &str) -> Result<String, NewsError> {
        let text = self.fetch_text(url).await?;
        let page = truncate_chars(&text, MAX_PAGE_CHARS);
        debug!("{url}: {} chars of page text", page.chars().count());

        let prompt = Prompt {
            system: Some(EXTRACTOR_PROMPT.to_string()),
            user: page.to_string(),
            temperature: 0.1,
            max_tokens: 2048,
        };
        Ok(self.generator.generate(&prompt).await?)
    }
}
