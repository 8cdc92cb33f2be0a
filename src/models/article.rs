use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    /// Canonical discovery url, the deduplication key.
    pub url: String,
    /// Where the discovery url led after redirects, once extraction has run.
    pub resolved_url: Option<String>,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub script: Option<String>,
    pub video_url: Option<String>,
    pub status: ArticleStatus,
    pub failure_reason: Option<String>,
    pub render_job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// A (title, url) pair produced by news discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            published_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    New,
    Extracted,
    Ready,
    VideoGenerated,
    ExtractionFailed,
    SummaryFailed,
    RenderFailed,
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 7] = [
        ArticleStatus::New,
        ArticleStatus::Extracted,
        ArticleStatus::Ready,
        ArticleStatus::VideoGenerated,
        ArticleStatus::ExtractionFailed,
        ArticleStatus::SummaryFailed,
        ArticleStatus::RenderFailed,
    ];

    /// Statuses a resume pass picks up: work stopped before the article became ready.
    pub const RESUMABLE: [ArticleStatus; 4] = [
        ArticleStatus::New,
        ArticleStatus::Extracted,
        ArticleStatus::ExtractionFailed,
        ArticleStatus::SummaryFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::New => "new",
            ArticleStatus::Extracted => "extracted",
            ArticleStatus::Ready => "ready",
            ArticleStatus::VideoGenerated => "video_generated",
            ArticleStatus::ExtractionFailed => "extraction_failed",
            ArticleStatus::SummaryFailed => "summary_failed",
            ArticleStatus::RenderFailed => "render_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ArticleStatus::ExtractionFailed
                | ArticleStatus::SummaryFailed
                | ArticleStatus::RenderFailed
        )
    }

    /// Whether a script is stored and a render may be requested.
    pub fn is_renderable(&self) -> bool {
        matches!(self, ArticleStatus::Ready | ArticleStatus::RenderFailed)
    }

    pub fn can_transition_to(&self, next: ArticleStatus) -> bool {
        Transition::sources_for(next).contains(self)
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown article status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for ArticleStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArticleStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// A single step through the article lifecycle together with the data it writes.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Extracted {
        content: String,
        title: Option<String>,
        resolved_url: Option<String>,
    },
    ExtractionFailed {
        reason: String,
    },
    Summarized {
        summary: String,
        script: String,
    },
    SummaryFailed {
        reason: String,
    },
    VideoGenerated {
        video_url: String,
    },
    RenderFailed {
        reason: String,
    },
}

/// Column values written by a transition. `None` leaves the stored value untouched,
/// except `failure_reason` which is always overwritten.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub script: Option<String>,
    pub video_url: Option<String>,
    pub resolved_url: Option<String>,
    pub failure_reason: Option<String>,
}

impl Transition {
    pub fn target(&self) -> ArticleStatus {
        match self {
            Transition::Extracted { .. } => ArticleStatus::Extracted,
            Transition::ExtractionFailed { .. } => ArticleStatus::ExtractionFailed,
            Transition::Summarized { .. } => ArticleStatus::Ready,
            Transition::SummaryFailed { .. } => ArticleStatus::SummaryFailed,
            Transition::VideoGenerated { .. } => ArticleStatus::VideoGenerated,
            Transition::RenderFailed { .. } => ArticleStatus::RenderFailed,
        }
    }

    pub fn allowed_from(&self) -> &'static [ArticleStatus] {
        Self::sources_for(self.target())
    }

    fn sources_for(target: ArticleStatus) -> &'static [ArticleStatus] {
        use ArticleStatus::*;
        match target {
            Extracted | ExtractionFailed => &[New, ExtractionFailed],
            Ready | SummaryFailed => &[Extracted, SummaryFailed],
            VideoGenerated | RenderFailed => &[Ready, RenderFailed],
            New => &[],
        }
    }

    pub fn fields(&self) -> FieldUpdate {
        match self {
            Transition::Extracted {
                content,
                title,
                resolved_url,
            } => FieldUpdate {
                title: title.clone(),
                content: Some(content.clone()),
                resolved_url: resolved_url.clone(),
                ..Default::default()
            },
            Transition::Summarized { summary, script } => FieldUpdate {
                summary: Some(summary.clone()),
                script: Some(script.clone()),
                ..Default::default()
            },
            Transition::VideoGenerated { video_url } => FieldUpdate {
                video_url: Some(video_url.clone()),
                ..Default::default()
            },
            Transition::ExtractionFailed { reason }
            | Transition::SummaryFailed { reason }
            | Transition::RenderFailed { reason } => FieldUpdate {
                failure_reason: Some(reason.clone()),
                ..Default::default()
            },
        }
    }
}

/// Filter for listing stored articles. An empty status set matches every article.
#[derive(Debug, Clone)]
pub struct ArticleFilter {
    pub statuses: Vec<ArticleStatus>,
    pub limit: usize,
}

impl ArticleFilter {
    pub fn latest(limit: usize) -> Self {
        Self {
            statuses: Vec::new(),
            limit,
        }
    }

    pub fn with_status(mut self, status: ArticleStatus) -> Self {
        self.statuses.push(status);
        self
    }
}

impl Default for ArticleFilter {
    fn default() -> Self {
        Self::latest(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ArticleStatus::*;

    #[test]
    fn status_parses_from_stored_name() {
        for status in ArticleStatus::ALL {
            assert_eq!(status.as_str().parse::<ArticleStatus>().unwrap(), status);
        }
        assert!("done".parse::<ArticleStatus>().is_err());
    }

    #[test]
    fn happy_path_is_a_valid_walk() {
        let path = [New, Extracted, Ready, VideoGenerated];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failures_retry_only_their_own_stage() {
        assert!(ExtractionFailed.can_transition_to(Extracted));
        assert!(SummaryFailed.can_transition_to(Ready));
        assert!(RenderFailed.can_transition_to(VideoGenerated));
        assert!(RenderFailed.can_transition_to(RenderFailed));

        assert!(!ExtractionFailed.can_transition_to(Ready));
        assert!(!SummaryFailed.can_transition_to(Extracted));
    }

    #[test]
    fn nothing_regresses() {
        assert!(!VideoGenerated.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Extracted));
        assert!(!Extracted.can_transition_to(New));
        for status in ArticleStatus::ALL {
            assert!(!status.can_transition_to(New));
            assert!(!VideoGenerated.can_transition_to(status));
        }
    }

    #[test]
    fn failure_fields_only_touch_reason() {
        let update = Transition::SummaryFailed {
            reason: "model refused".into(),
        }
        .fields();

        assert_eq!(update.failure_reason.as_deref(), Some("model refused"));
        assert!(update.content.is_none());
        assert!(update.summary.is_none());
        assert!(update.script.is_none());
    }

    #[test]
    fn renderable_statuses() {
        assert!(Ready.is_renderable());
        assert!(RenderFailed.is_renderable());
        assert!(!Extracted.is_renderable());
        assert!(!VideoGenerated.is_renderable());
    }
}
