mod repository;
mod schema;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Article, ArticleFilter, NewArticle, Transition};

pub use repository::Repository;

#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Article),
    /// The url was already stored; carries the existing row untouched.
    Duplicate(Article),
}

/// Durable article storage. Every operation is atomic for a single article.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Inserts a new article in status `new`, or reports the existing one for that url.
    async fn create(&self, article: NewArticle) -> Result<CreateOutcome>;

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Writes the transition's fields and target status together, provided the
    /// article currently sits in one of the transition's source statuses.
    async fn apply(&self, id: i64, transition: Transition) -> Result<Article>;

    /// Remembers the provider job backing the article's latest render attempt.
    async fn record_render_job(&self, id: i64, job_id: &str) -> Result<()>;

    async fn list(&self, filter: &ArticleFilter) -> Result<Vec<Article>>;
}
