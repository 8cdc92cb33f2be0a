use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;

use crate::config::SearchConfig;
use crate::error::{AppError, Result};
use crate::models::Candidate;

use super::Discovery;

/// News discovery backed by the Google News RSS search endpoint.
pub struct GoogleNewsSearch {
    client: Client,
    config: SearchConfig,
}

impl GoogleNewsSearch {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("newscast/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    fn search_url(&self, topic: &str) -> String {
        let language = &self.config.language;
        let country = &self.config.country;
        format!(
            "{}/rss/search?q={}&hl={}-{}&gl={}&ceid={}:{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(topic),
            language,
            country,
            country,
            country,
            language,
        )
    }

    async fn fetch(&self, topic: &str) -> Result<Vec<u8>> {
        let response = self.client.get(self.search_url(topic)).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(AppError::Upstream {
                service: "google-news",
                status,
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Turns an RSS search result into candidates, skipping entries without a link.
pub(crate) fn parse_candidates(bytes: &[u8], limit: usize) -> Result<Vec<Candidate>> {
    let feed = parser::parse(bytes)?;

    let candidates = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry.links.first().map(|l| l.href.trim().to_string())?;
            if url.is_empty() {
                return None;
            }
            Some(Candidate {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                url,
                published_at: entry.published.or(entry.updated),
            })
        })
        .take(limit)
        .collect();

    Ok(candidates)
}

#[async_trait]
impl Discovery for GoogleNewsSearch {
    async fn search(&self, topic: &str, limit: usize) -> Result<Vec<Candidate>> {
        let bytes = match self.fetch(topic).await {
            Ok(bytes) => bytes,
            // Throttling and 5xx stay retryable; the orchestrator decides when to give up.
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => return Err(AppError::SearchUnavailable(e.to_string())),
        };

        let candidates = parse_candidates(&bytes, limit)
            .map_err(|e| AppError::SearchUnavailable(format!("unreadable search results: {e}")))?;

        tracing::debug!(topic, found = candidates.len(), "News search complete");
        Ok(candidates)
    }
}
