mod summarizer;

use async_trait::async_trait;

use crate::error::Result;

pub use summarizer::OpenAiSummarizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedSummary {
    pub summary: String,
    /// Spoken news-anchor script derived from the summary.
    pub script: String,
}

/// Turns article text into a short summary and a spoken script, one model call each.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// A short factual summary of `content`.
    async fn condense(&self, title: &str, content: &str) -> Result<String>;

    /// An anchor script built from the headline and an earlier summary.
    async fn write_script(&self, title: &str, summary: &str) -> Result<String>;

    async fn summarize(&self, title: &str, content: &str) -> Result<ScriptedSummary> {
        let summary = self.condense(title, content).await?;
        let script = self.write_script(title, &summary).await?;
        Ok(ScriptedSummary { summary, script })
    }
}
