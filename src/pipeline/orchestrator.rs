use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ai::{ScriptedSummary, Summarizer};
use crate::config::PipelineConfig;
use crate::db::{ArticleStore, CreateOutcome};
use crate::error::{AppError, Result};
use crate::models::{
    Article, ArticleFilter, ArticleStatus, Candidate, CandidateOutcome, JobStatus, NewArticle,
    RenderJob, RenderOutput, RunReport, Transition,
};
use crate::services::{Discovery, Extractor, VideoRenderer};
use crate::utils::truncate_chars;

use super::canonical::canonicalize_url;
use super::poll::{wait_for_terminal, PollOutcome, PollSchedule};
use super::retry::with_backoff;
use super::single_flight::SingleFlight;

const CANCELLED: &str = "cancelled";

/// The external services a pipeline talks to.
pub struct Collaborators {
    pub discovery: Arc<dyn Discovery>,
    pub extractor: Arc<dyn Extractor>,
    pub summarizer: Arc<dyn Summarizer>,
    pub renderer: Arc<dyn VideoRenderer>,
}

/// What to do about a job recorded by an earlier render attempt.
enum PriorJob {
    Finished { job: RenderJob, video_url: String },
    StillRunning(RenderJob),
    None,
}

/// Drives articles from discovery to a ready script, and from a ready script to a video.
pub struct PipelineOrchestrator {
    store: Arc<dyn ArticleStore>,
    discovery: Arc<dyn Discovery>,
    extractor: Arc<dyn Extractor>,
    summarizer: Arc<dyn Summarizer>,
    renderer: Arc<dyn VideoRenderer>,
    config: PipelineConfig,
    renders: SingleFlight<i64>,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        collaborators: Collaborators,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            discovery: collaborators.discovery,
            extractor: collaborators.extractor,
            summarizer: collaborators.summarizer,
            renderer: collaborators.renderer,
            config,
            renders: SingleFlight::new(),
        }
    }

    pub async fn run(&self, topic: &str, limit: usize) -> Result<RunReport> {
        self.run_until(topic, limit, &CancellationToken::new()).await
    }

    /// Discovers up to `limit` articles for `topic` and takes each new one as far as `ready`.
    ///
    /// Candidates are processed concurrently and independently: one failing article never
    /// stops the others. Only a failed search or a storage error fails the run itself, and a
    /// storage error is returned after every in-flight candidate has settled.
    pub async fn run_until(
        &self,
        topic: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AppError::InvalidInput("topic must not be empty".into()));
        }
        if limit == 0 {
            return Err(AppError::InvalidInput("limit must be at least 1".into()));
        }

        info!(topic, limit, "Starting pipeline run");
        let token = cancel.child_token();
        let watchdog = self.spawn_deadline(&token);

        let search = with_backoff(&self.config.retry, "search", || {
            self.discovery.search(topic, limit)
        });
        let found = until_cancelled(&token, search).await;
        let mut candidates = match found {
            Some(Ok(candidates)) => candidates,
            None => {
                watchdog.abort();
                warn!(topic, "Run cancelled during news search");
                return Err(AppError::Cancelled);
            }
            Some(Err(e)) => {
                watchdog.abort();
                return Err(match e {
                    AppError::SearchUnavailable(reason) => AppError::SearchUnavailable(reason),
                    other => AppError::SearchUnavailable(other.to_string()),
                });
            }
        };
        candidates.truncate(limit);

        let mut report = RunReport::for_topic(topic);
        report.discovered = candidates.len();

        let results: Vec<Result<CandidateOutcome>> = stream::iter(candidates)
            .map(|candidate| self.process_candidate(candidate, &token))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        watchdog.abort();

        let mut report = tally(report, results, &token)?;
        report.created = report.extraction_failed + report.summary_failed + report.ready;
        info!(
            topic,
            discovered = report.discovered,
            created = report.created,
            ready = report.ready,
            skipped = report.skipped_duplicate,
            cancelled = report.cancelled,
            "Pipeline run finished"
        );
        Ok(report)
    }

    pub async fn resume(&self, limit: usize) -> Result<RunReport> {
        self.resume_until(limit, &CancellationToken::new()).await
    }

    /// Picks up stored articles that stopped short of `ready` and advances them again.
    /// Extraction is only repeated for articles that never got content.
    pub async fn resume_until(&self, limit: usize, cancel: &CancellationToken) -> Result<RunReport> {
        if limit == 0 {
            return Err(AppError::InvalidInput("limit must be at least 1".into()));
        }

        let filter = ArticleFilter {
            statuses: ArticleStatus::RESUMABLE.to_vec(),
            limit,
        };
        let pending = self.store.list(&filter).await?;
        info!(pending = pending.len(), "Resuming unfinished articles");

        let report = RunReport {
            discovered: pending.len(),
            ..Default::default()
        };

        let token = cancel.child_token();
        let watchdog = self.spawn_deadline(&token);
        let results: Vec<Result<CandidateOutcome>> = stream::iter(pending)
            .map(|article| {
                let token = &token;
                async move {
                    if token.is_cancelled() {
                        return Ok(CandidateOutcome::NotStarted);
                    }
                    self.advance(article, token).await
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        watchdog.abort();

        tally(report, results, &token)
    }

    pub async fn render(&self, article_id: i64, voice: Option<&str>) -> Result<RenderOutput> {
        self.render_until(article_id, voice, &CancellationToken::new())
            .await
    }

    /// Renders the article's script into a video and waits for the provider to finish.
    ///
    /// At most one render per article runs at a time; a second request fails with
    /// `AlreadyInProgress` instead of starting another provider job. A retry after a failed
    /// or timed-out attempt picks up the job recorded for the earlier attempt when the
    /// provider still knows about it.
    pub async fn render_until(
        &self,
        article_id: i64,
        voice: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RenderOutput> {
        let _flight = self
            .renders
            .try_acquire(article_id)
            .ok_or(AppError::AlreadyInProgress(article_id))?;

        let article = self
            .store
            .find_by_id(article_id)
            .await?
            .ok_or(AppError::ArticleNotFound(article_id))?;
        let script = match article.script.as_deref() {
            Some(script) if article.status.is_renderable() && !script.trim().is_empty() => {
                script.to_string()
            }
            _ => {
                return Err(AppError::InvalidState {
                    id: article_id,
                    status: article.status.to_string(),
                })
            }
        };

        let Some(prior) = until_cancelled(cancel, self.prior_job(&article)).await else {
            self.fail_render(&article, CANCELLED.into()).await?;
            return Err(AppError::Cancelled);
        };
        let job = match prior {
            PriorJob::Finished { job, video_url } => {
                return self.finish_render(&article, job, video_url).await
            }
            PriorJob::StillRunning(job) => job,
            PriorJob::None => self.start_render(&article, &script, voice, cancel).await?,
        };
        info!(article_id, job_id = %job.id, "Waiting for video render");

        let renderer = &self.renderer;
        let polled = &job;
        let outcome = wait_for_terminal(PollSchedule::from(&self.config.render), cancel, move || async move {
            match renderer.status(polled).await {
                Ok(JobStatus::Pending) => Ok(None),
                Ok(JobStatus::Done { video_url }) => Ok(Some(Ok(video_url))),
                Ok(JobStatus::Failed { reason }) => Ok(Some(Err(reason))),
                Err(e) if e.is_transient() => {
                    warn!(job_id = %polled.id, error = %e, "Render status check failed, polling again");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await;

        match outcome {
            Ok(PollOutcome::Finished(Ok(video_url))) => {
                self.finish_render(&article, job, video_url).await
            }
            Ok(PollOutcome::Finished(Err(reason))) => {
                self.fail_render(&article, reason.clone()).await?;
                Err(AppError::RenderFailed(reason))
            }
            Ok(PollOutcome::TimedOut { waited }) => {
                let reason = format!(
                    "no result for job {} after {}s; it may still finish",
                    job.id,
                    waited.as_secs()
                );
                self.fail_render(&article, reason).await?;
                Err(AppError::RenderTimeout {
                    job_id: job.id,
                    waited,
                })
            }
            Ok(PollOutcome::Cancelled) => {
                self.fail_render(&article, CANCELLED.into()).await?;
                Err(AppError::Cancelled)
            }
            Err(e) => {
                self.fail_render(&article, e.to_string()).await?;
                Err(e)
            }
        }
    }

    pub async fn list(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        self.store.list(filter).await
    }

    pub async fn article(&self, article_id: i64) -> Result<Article> {
        self.store
            .find_by_id(article_id)
            .await?
            .ok_or(AppError::ArticleNotFound(article_id))
    }

    async fn process_candidate(
        &self,
        candidate: Candidate,
        cancel: &CancellationToken,
    ) -> Result<CandidateOutcome> {
        if cancel.is_cancelled() {
            return Ok(CandidateOutcome::NotStarted);
        }

        let new = NewArticle {
            url: canonicalize_url(&candidate.url),
            title: candidate.title.trim().to_string(),
            published_at: candidate.published_at,
        };
        let article = match self.store.create(new).await? {
            CreateOutcome::Created(article) => article,
            CreateOutcome::Duplicate(existing) => {
                debug!(article_id = existing.id, url = %existing.url, "Already seen, skipping");
                return Ok(CandidateOutcome::SkippedDuplicate);
            }
        };
        debug!(article_id = article.id, url = %article.url, "Created article");

        self.advance(article, cancel).await
    }

    /// Runs whichever of extraction and summarization the article still needs.
    async fn advance(
        &self,
        mut article: Article,
        cancel: &CancellationToken,
    ) -> Result<CandidateOutcome> {
        if matches!(
            article.status,
            ArticleStatus::New | ArticleStatus::ExtractionFailed
        ) {
            article = self.extract(article, cancel).await?;
        }
        if matches!(
            article.status,
            ArticleStatus::Extracted | ArticleStatus::SummaryFailed
        ) {
            article = self.summarize(article, cancel).await?;
        }

        Ok(match article.status {
            ArticleStatus::New | ArticleStatus::ExtractionFailed => CandidateOutcome::ExtractionFailed,
            ArticleStatus::Extracted | ArticleStatus::SummaryFailed => CandidateOutcome::SummaryFailed,
            ArticleStatus::Ready | ArticleStatus::VideoGenerated | ArticleStatus::RenderFailed => {
                CandidateOutcome::Ready
            }
        })
    }

    async fn extract(&self, article: Article, cancel: &CancellationToken) -> Result<Article> {
        let attempt = with_backoff(&self.config.retry, "extract", || {
            self.extractor.extract(&article.url)
        });

        let transition = match until_cancelled(cancel, attempt).await {
            None => Transition::ExtractionFailed {
                reason: CANCELLED.into(),
            },
            Some(Err(e)) => Transition::ExtractionFailed {
                reason: e.to_string(),
            },
            Some(Ok(page)) => {
                let chars = page.content.chars().count();
                if chars < self.config.min_content_chars {
                    Transition::ExtractionFailed {
                        reason: format!(
                            "content too short ({chars} chars, need {})",
                            self.config.min_content_chars
                        ),
                    }
                } else {
                    Transition::Extracted {
                        content: truncate_chars(&page.content, self.config.max_content_chars)
                            .to_string(),
                        title: page.title.filter(|title| !title.trim().is_empty()),
                        resolved_url: page.final_url.map(|url| canonicalize_url(&url)),
                    }
                }
            }
        };

        if let Transition::ExtractionFailed { reason } = &transition {
            warn!(article_id = article.id, url = %article.url, %reason, "Extraction failed");
        }
        self.commit(&article, transition).await
    }

    async fn summarize(&self, article: Article, cancel: &CancellationToken) -> Result<Article> {
        let Some(content) = article.content.as_deref() else {
            let transition = Transition::SummaryFailed {
                reason: "no stored content to summarize".into(),
            };
            return self.commit(&article, transition).await;
        };

        // Summary and script are retried separately.
        let attempt = async {
            let summary = with_backoff(&self.config.retry, "summarize", || {
                self.summarizer.condense(&article.title, content)
            })
            .await?;
            let script = with_backoff(&self.config.retry, "write script", || {
                self.summarizer.write_script(&article.title, &summary)
            })
            .await?;
            Ok::<_, AppError>(ScriptedSummary { summary, script })
        };

        let transition = match until_cancelled(cancel, attempt).await {
            None => Transition::SummaryFailed {
                reason: CANCELLED.into(),
            },
            Some(Err(e)) => Transition::SummaryFailed {
                reason: e.to_string(),
            },
            Some(Ok(output)) if output.script.trim().is_empty() => Transition::SummaryFailed {
                reason: "summarizer returned an empty script".into(),
            },
            Some(Ok(output)) => Transition::Summarized {
                summary: output.summary,
                script: output.script,
            },
        };

        if let Transition::SummaryFailed { reason } = &transition {
            warn!(article_id = article.id, %reason, "Summarization failed");
        } else {
            info!(article_id = article.id, title = %article.title, "Article ready");
        }
        self.commit(&article, transition).await
    }

    /// Persists a stage result. When the article was moved by someone else in the meantime,
    /// their state wins and is returned instead.
    async fn commit(&self, article: &Article, transition: Transition) -> Result<Article> {
        match self.store.apply(article.id, transition).await {
            Err(AppError::InvalidTransition { from, to }) => {
                warn!(article_id = article.id, %from, %to, "Article changed concurrently, keeping stored state");
                self.article(article.id).await
            }
            result => result,
        }
    }

    async fn prior_job(&self, article: &Article) -> PriorJob {
        let (ArticleStatus::RenderFailed, Some(job_id)) =
            (article.status, article.render_job_id.as_deref())
        else {
            return PriorJob::None;
        };

        let job = RenderJob::new(job_id);
        match self.renderer.status(&job).await {
            Ok(JobStatus::Done { video_url }) => {
                info!(article_id = article.id, job_id, "Earlier render job has finished");
                PriorJob::Finished { job, video_url }
            }
            Ok(JobStatus::Pending) => {
                info!(article_id = article.id, job_id, "Earlier render job still running");
                PriorJob::StillRunning(job)
            }
            Ok(JobStatus::Failed { reason }) => {
                debug!(article_id = article.id, job_id, %reason, "Earlier render job failed, starting a new one");
                PriorJob::None
            }
            Err(e) if e.is_transient() => PriorJob::StillRunning(job),
            Err(e) => {
                debug!(article_id = article.id, job_id, error = %e, "Earlier render job unknown, starting a new one");
                PriorJob::None
            }
        }
    }

    // Not retried: a start that failed on our side may still have created a provider job.
    async fn start_render(
        &self,
        article: &Article,
        script: &str,
        voice: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RenderJob> {
        match until_cancelled(cancel, self.renderer.start(script, voice)).await {
            None => {
                self.fail_render(article, CANCELLED.into()).await?;
                Err(AppError::Cancelled)
            }
            Some(Ok(job)) => {
                if let Err(e) = self.store.record_render_job(article.id, &job.id).await {
                    // Live provider job the store does not know about.
                    error!(article_id = article.id, job_id = %job.id, error = %e, "Render job started but not recorded");
                    return Err(e);
                }
                Ok(job)
            }
            Some(Err(e)) => {
                let reason = format!("could not start render: {e}");
                self.fail_render(article, reason.clone()).await?;
                Err(AppError::RenderFailed(reason))
            }
        }
    }

    async fn finish_render(
        &self,
        article: &Article,
        job: RenderJob,
        video_url: String,
    ) -> Result<RenderOutput> {
        self.store
            .apply(
                article.id,
                Transition::VideoGenerated {
                    video_url: video_url.clone(),
                },
            )
            .await?;
        info!(article_id = article.id, job_id = %job.id, %video_url, "Video generated");

        Ok(RenderOutput {
            article_id: article.id,
            video_url,
            job_id: job.id,
        })
    }

    async fn fail_render(&self, article: &Article, reason: String) -> Result<()> {
        error!(article_id = article.id, %reason, "Render failed");
        self.store
            .apply(article.id, Transition::RenderFailed { reason })
            .await?;
        Ok(())
    }

    fn spawn_deadline(&self, token: &CancellationToken) -> JoinHandle<()> {
        let token = token.clone();
        let deadline = self.config.run_deadline();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!(?deadline, "Run deadline reached, cancelling remaining work");
            token.cancel();
        })
    }
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, work: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = work => Some(output),
    }
}

fn tally(
    mut report: RunReport,
    results: Vec<Result<CandidateOutcome>>,
    token: &CancellationToken,
) -> Result<RunReport> {
    let mut first_error = None;
    for result in results {
        match result {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                error!(error = %e, "Storage failure while processing an article");
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    report.cancelled = token.is_cancelled();
    Ok(report)
}
