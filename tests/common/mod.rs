#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use newscast::ai::Summarizer;
use newscast::config::{PipelineConfig, RenderConfig, RetryConfig};
use newscast::db::{ArticleStore, CreateOutcome, Repository};
use newscast::error::{AppError, Result};
use newscast::models::{Article, Candidate, JobStatus, NewArticle, RenderJob, Transition};
use newscast::pipeline::{Collaborators, PipelineOrchestrator};
use newscast::services::{Discovery, ExtractedPage, Extractor, VideoRenderer};

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        concurrency: 3,
        min_content_chars: 40,
        max_content_chars: 2_000,
        run_deadline_secs: 600,
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
        },
        render: RenderConfig {
            poll_interval_secs: 1,
            timeout_secs: 3,
        },
    }
}

pub fn article_body(url: &str) -> String {
    format!("Reporters followed the story published at {url} through the whole week. ").repeat(3)
}

pub struct ScriptedDiscovery {
    candidates: Vec<Candidate>,
    unavailable: bool,
    stalled: bool,
}

impl ScriptedDiscovery {
    pub fn new(urls: &[&str]) -> Self {
        let candidates = urls
            .iter()
            .enumerate()
            .map(|(i, url)| Candidate::new(format!("Story {}", i + 1), *url))
            .collect();
        Self {
            candidates,
            unavailable: false,
            stalled: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            candidates: Vec::new(),
            unavailable: true,
            stalled: false,
        }
    }

    /// A search that never answers.
    pub fn stalled() -> Self {
        Self {
            candidates: Vec::new(),
            unavailable: false,
            stalled: true,
        }
    }
}

#[async_trait]
impl Discovery for ScriptedDiscovery {
    async fn search(&self, _topic: &str, limit: usize) -> Result<Vec<Candidate>> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if self.unavailable {
            return Err(AppError::SearchUnavailable("connection refused".into()));
        }
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeExtractor {
    failing: HashSet<String>,
    thin: HashSet<String>,
    stalled: HashSet<String>,
    redirects: HashMap<String, String>,
    flaky: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Returns a page with almost no text for `url`.
    pub fn thin(mut self, url: &str) -> Self {
        self.thin.insert(url.to_string());
        self
    }

    /// Never answers for `url`.
    pub fn stalled(mut self, url: &str) -> Self {
        self.stalled.insert(url.to_string());
        self
    }

    /// Reports that `url` redirected to `target`.
    pub fn redirecting(mut self, url: &str, target: &str) -> Self {
        self.redirects.insert(url.to_string(), target.to_string());
        self
    }

    /// Fails `times` times with a retryable upstream error before answering.
    pub fn flaky(self, url: &str, times: u32) -> Self {
        self.flaky.lock().unwrap().insert(url.to_string(), times);
        self
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedPage> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

        if self.stalled.contains(url) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(url) {
            return Err(AppError::ExtractionFailed("blocked by paywall".into()));
        }
        if let Some(remaining) = self.flaky.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::Upstream {
                    service: "article-host",
                    status: 503,
                    message: "try again".into(),
                });
            }
        }

        let content = if self.thin.contains(url) {
            "Subscribe to read.".to_string()
        } else {
            article_body(url)
        };
        Ok(ExtractedPage {
            content,
            title: Some(format!("Page title for {url}")),
            final_url: self.redirects.get(url).cloned(),
        })
    }
}

#[derive(Default)]
pub struct FakeSummarizer {
    failing: AtomicBool,
    flaky_scripts: AtomicUsize,
    summary_calls: AtomicUsize,
    script_calls: AtomicUsize,
}

impl FakeSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The next `times` script calls fail with a retryable upstream error.
    pub fn set_flaky_scripts(&self, times: usize) {
        self.flaky_scripts.store(times, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    pub fn script_calls(&self) -> usize {
        self.script_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn condense(&self, title: &str, _content: &str) -> Result<String> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::SummarizationFailed("model refused".into()));
        }
        Ok(format!("In short: {title}."))
    }

    async fn write_script(&self, title: &str, _summary: &str) -> Result<String> {
        self.script_calls.fetch_add(1, Ordering::SeqCst);
        let flaky = self
            .flaky_scripts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if flaky {
            return Err(AppError::Upstream {
                service: "openai",
                status: 503,
                message: "overloaded".into(),
            });
        }
        Ok(format!("Good evening. {title}. More after the break."))
    }
}

/// Answers status checks from a queue; once the queue is empty every job stays pending.
#[derive(Default)]
pub struct FakeRenderer {
    statuses: Mutex<VecDeque<JobStatus>>,
    stalled_start: bool,
    starts: AtomicUsize,
    voices: Mutex<Vec<Option<String>>>,
}

impl FakeRenderer {
    pub fn new(statuses: Vec<JobStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Default::default()
        }
    }

    /// A renderer whose `start` never answers.
    pub fn stalled_start() -> Self {
        Self {
            stalled_start: true,
            ..Default::default()
        }
    }

    pub fn done(video_url: &str) -> JobStatus {
        JobStatus::Done {
            video_url: video_url.to_string(),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn voices(&self) -> Vec<Option<String>> {
        self.voices.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoRenderer for FakeRenderer {
    async fn start(&self, _script: &str, voice: Option<&str>) -> Result<RenderJob> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.stalled_start {
            std::future::pending::<()>().await;
        }
        self.voices.lock().unwrap().push(voice.map(str::to_string));
        Ok(RenderJob::new(format!("job-{n}")))
    }

    async fn status(&self, _job: &RenderJob) -> Result<JobStatus> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JobStatus::Pending))
    }
}

pub struct Harness {
    pub store: Arc<Repository>,
    pub orchestrator: PipelineOrchestrator,
    pub extractor: Arc<FakeExtractor>,
    pub summarizer: Arc<FakeSummarizer>,
    pub renderer: Arc<FakeRenderer>,
}

pub async fn harness(
    discovery: ScriptedDiscovery,
    extractor: FakeExtractor,
    renderer: FakeRenderer,
    config: PipelineConfig,
) -> Harness {
    let store = Arc::new(Repository::open_in_memory().await.unwrap());
    let extractor = Arc::new(extractor);
    let summarizer = Arc::new(FakeSummarizer::new());
    let renderer = Arc::new(renderer);

    let orchestrator = PipelineOrchestrator::new(
        store.clone(),
        Collaborators {
            discovery: Arc::new(discovery),
            extractor: extractor.clone(),
            summarizer: summarizer.clone(),
            renderer: renderer.clone(),
        },
        config,
    );

    Harness {
        store,
        orchestrator,
        extractor,
        summarizer,
        renderer,
    }
}

/// Stores an article that already has a script, bypassing discovery.
pub async fn seed_ready(store: &Repository, url: &str) -> Article {
    let CreateOutcome::Created(article) = store
        .create(NewArticle {
            url: url.to_string(),
            title: "Seeded story".into(),
            published_at: None,
        })
        .await
        .unwrap()
    else {
        panic!("{url} was already stored");
    };

    store
        .apply(
            article.id,
            Transition::Extracted {
                content: article_body(url),
                title: None,
                resolved_url: None,
            },
        )
        .await
        .unwrap();
    store
        .apply(
            article.id,
            Transition::Summarized {
                summary: "In short: seeded.".into(),
                script: "Good evening. Seeded story.".into(),
            },
        )
        .await
        .unwrap()
}
