mod content_fetcher;
mod disabled;
mod google_news;
mod heygen;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Candidate, JobStatus, RenderJob};

pub use content_fetcher::ContentFetcher;
pub use disabled::Disabled;
pub use google_news::GoogleNewsSearch;
pub use heygen::HeyGenRenderer;

/// Finds candidate articles for a topic.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Returns at most `limit` candidates; fewer is not an error.
    /// Fails with `SearchUnavailable` when the upstream service cannot be reached.
    async fn search(&self, topic: &str, limit: usize) -> Result<Vec<Candidate>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPage {
    pub content: String,
    pub title: Option<String>,
    /// Where the request ended up after redirects.
    pub final_url: Option<String>,
}

/// Pulls the readable text out of an article page.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Empty content is a valid result, not an error.
    async fn extract(&self, url: &str) -> Result<ExtractedPage>;
}

/// An asynchronous avatar video service.
#[async_trait]
pub trait VideoRenderer: Send + Sync {
    /// Submits a render and returns immediately with the provider's job handle.
    async fn start(&self, script: &str, voice: Option<&str>) -> Result<RenderJob>;

    async fn status(&self, job: &RenderJob) -> Result<JobStatus>;
}
