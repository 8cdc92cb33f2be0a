use async_trait::async_trait;

use crate::ai::Summarizer;
use crate::error::{AppError, Result};
use crate::models::{Candidate, JobStatus, RenderJob};

use super::{Discovery, ExtractedPage, Extractor, VideoRenderer};

/// Stands in for a collaborator the current command does not use, so its
/// credentials are not required. Every call fails with a configuration error.
#[derive(Debug, Clone, Copy)]
pub struct Disabled {
    what: &'static str,
}

impl Disabled {
    pub fn new(what: &'static str) -> Self {
        Self { what }
    }

    fn error(&self) -> AppError {
        AppError::Config(format!("{} is not set up for this command", self.what))
    }
}

#[async_trait]
impl Discovery for Disabled {
    async fn search(&self, _topic: &str, _limit: usize) -> Result<Vec<Candidate>> {
        Err(self.error())
    }
}

#[async_trait]
impl Extractor for Disabled {
    async fn extract(&self, _url: &str) -> Result<ExtractedPage> {
        Err(self.error())
    }
}

#[async_trait]
impl Summarizer for Disabled {
    async fn condense(&self, _title: &str, _content: &str) -> Result<String> {
        Err(self.error())
    }

    async fn write_script(&self, _title: &str, _summary: &str) -> Result<String> {
        Err(self.error())
    }
}

#[async_trait]
impl VideoRenderer for Disabled {
    async fn start(&self, _script: &str, _voice: Option<&str>) -> Result<RenderJob> {
        Err(self.error())
    }

    async fn status(&self, _job: &RenderJob) -> Result<JobStatus> {
        Err(self.error())
    }
}
