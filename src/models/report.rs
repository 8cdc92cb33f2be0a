use serde::{Deserialize, Serialize};

/// How one discovered candidate (or resumed article) left a pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    SkippedDuplicate,
    ExtractionFailed,
    SummaryFailed,
    Ready,
    NotStarted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub topic: Option<String>,
    pub discovered: usize,
    pub created: usize,
    pub skipped_duplicate: usize,
    pub extraction_failed: usize,
    pub summary_failed: usize,
    pub ready: usize,
    pub not_started: usize,
    pub cancelled: bool,
}

impl RunReport {
    pub fn for_topic(topic: &str) -> Self {
        Self {
            topic: Some(topic.to_string()),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: CandidateOutcome) {
        match outcome {
            CandidateOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            CandidateOutcome::ExtractionFailed => self.extraction_failed += 1,
            CandidateOutcome::SummaryFailed => self.summary_failed += 1,
            CandidateOutcome::Ready => self.ready += 1,
            CandidateOutcome::NotStarted => self.not_started += 1,
        }
    }

    /// Number of candidates with a recorded outcome.
    pub fn accounted(&self) -> usize {
        self.skipped_duplicate
            + self.extraction_failed
            + self.summary_failed
            + self.ready
            + self.not_started
    }
}
