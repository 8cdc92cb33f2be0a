use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Article, ArticleFilter, ArticleStatus, NewArticle, Transition};

use super::schema::SCHEMA;
use super::{ArticleStore, CreateOutcome};

const ARTICLE_COLUMNS: &str = "id, url, title, published_at, content, summary, script, video_url, \
                               status, failure_reason, render_job_id, created_at, updated_at, resolved_url";

pub struct Repository {
    conn: Connection,
}

enum Applied {
    Done(Article),
    Rejected(ArticleStatus),
    Missing,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch(SCHEMA)?;
            // Databases created before redirects were recorded.
            let has_resolved_url = conn
                .prepare("SELECT 1 FROM pragma_table_info('articles') WHERE name = 'resolved_url'")?
                .exists([])?;
            if !has_resolved_url {
                conn.execute_batch("ALTER TABLE articles ADD COLUMN resolved_url TEXT")?;
            }
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl ArticleStore for Repository {
    async fn create(&self, article: NewArticle) -> Result<CreateOutcome> {
        let outcome = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    r#"INSERT INTO articles (url, title, published_at, status)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(url) DO NOTHING"#,
                    params![
                        article.url,
                        article.title,
                        article.published_at.map(|dt| dt.to_rfc3339()),
                        ArticleStatus::New.as_str(),
                    ],
                )?;
                let stored = conn.query_row(
                    &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?1"),
                    params![article.url],
                    |row| article_from_row(row),
                )?;
                Ok(if inserted == 1 {
                    CreateOutcome::Created(stored)
                } else {
                    CreateOutcome::Duplicate(stored)
                })
            })
            .await?;
        Ok(outcome)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>> {
        let url = url.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?1"),
                        params![url],
                        |row| article_from_row(row),
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
                        params![id],
                        |row| article_from_row(row),
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    async fn apply(&self, id: i64, transition: Transition) -> Result<Article> {
        let target = transition.target();
        let sources = status_list(transition.allowed_from());
        let fields = transition.fields();

        let applied = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    &format!(
                        r#"UPDATE articles SET
                               title = CASE WHEN title = '' THEN COALESCE(?1, title) ELSE title END,
                               content = COALESCE(?2, content),
                               summary = COALESCE(?3, summary),
                               script = COALESCE(?4, script),
                               video_url = COALESCE(?5, video_url),
                               resolved_url = COALESCE(?9, resolved_url),
                               status = ?6,
                               failure_reason = ?7,
                               updated_at = datetime('now')
                           WHERE id = ?8 AND status IN ({sources})"#
                    ),
                    params![
                        fields.title,
                        fields.content,
                        fields.summary,
                        fields.script,
                        fields.video_url,
                        target.as_str(),
                        fields.failure_reason,
                        id,
                        fields.resolved_url,
                    ],
                )?;
                let current = tx
                    .query_row(
                        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
                        params![id],
                        |row| article_from_row(row),
                    )
                    .optional()?;
                tx.commit()?;

                Ok(match current {
                    None => Applied::Missing,
                    Some(article) if changed == 0 => Applied::Rejected(article.status),
                    Some(article) => Applied::Done(article),
                })
            })
            .await?;

        match applied {
            Applied::Done(article) => Ok(article),
            Applied::Rejected(from) => Err(AppError::InvalidTransition {
                from: from.to_string(),
                to: target.to_string(),
            }),
            Applied::Missing => Err(AppError::ArticleNotFound(id)),
        }
    }

    async fn record_render_job(&self, id: i64, job_id: &str) -> Result<()> {
        let job_id = job_id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE articles SET render_job_id = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![job_id, id],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(AppError::ArticleNotFound(id));
        }
        Ok(())
    }

    async fn list(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        let mut sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles");
        if !filter.statuses.is_empty() {
            sql.push_str(&format!(" WHERE status IN ({})", status_list(&filter.statuses)));
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?1");
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);

        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(params![limit], |row| article_from_row(row))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }
}

/// Renders statuses as a quoted SQL list. Status names are fixed identifiers, never user text.
fn status_list(statuses: &[ArticleStatus]) -> String {
    statuses
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') format
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let status: String = row.get(8)?;
    let status = status
        .parse::<ArticleStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(Article {
        id: row.get(0)?,
        url: row.get(1)?,
        resolved_url: row.get(13)?,
        title: row.get(2)?,
        published_at: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| parse_datetime(&s)),
        content: row.get(4)?,
        summary: row.get(5)?,
        script: row.get(6)?,
        video_url: row.get(7)?,
        status,
        failure_reason: row.get(9)?,
        render_job_id: row.get(10)?,
        created_at: row
            .get::<_, String>(11)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(12)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_article(url: &str) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: format!("Title for {url}"),
            published_at: None,
        }
    }

    async fn created(repo: &Repository, url: &str) -> Article {
        match repo.create(new_article(url)).await.unwrap() {
            CreateOutcome::Created(article) => article,
            CreateOutcome::Duplicate(_) => panic!("{url} should be new"),
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_per_url() {
        let repo = Repository::open_in_memory().await.unwrap();

        let first = created(&repo, "https://news.example/a").await;
        assert_eq!(first.status, ArticleStatus::New);
        assert!(first.content.is_none());

        match repo.create(new_article("https://news.example/a")).await.unwrap() {
            CreateOutcome::Duplicate(existing) => assert_eq!(existing.id, first.id),
            CreateOutcome::Created(_) => panic!("duplicate url created a second row"),
        }

        let all = repo.list(&ArticleFilter::latest(10)).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn summary_failure_keeps_extracted_content() {
        let repo = Repository::open_in_memory().await.unwrap();
        let article = created(&repo, "https://news.example/b").await;

        repo.apply(
            article.id,
            Transition::Extracted {
                content: "body text".into(),
                title: None,
                resolved_url: None,
            },
        )
        .await
        .unwrap();
        let failed = repo
            .apply(
                article.id,
                Transition::SummaryFailed {
                    reason: "model timeout".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(failed.status, ArticleStatus::SummaryFailed);
        assert_eq!(failed.content.as_deref(), Some("body text"));
        assert_eq!(failed.failure_reason.as_deref(), Some("model timeout"));

        let ready = repo
            .apply(
                article.id,
                Transition::Summarized {
                    summary: "short".into(),
                    script: "Good evening.".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(ready.status, ArticleStatus::Ready);
        assert!(ready.failure_reason.is_none());
        assert_eq!(ready.content.as_deref(), Some("body text"));
    }

    #[tokio::test]
    async fn out_of_order_transition_is_rejected_without_writing() {
        let repo = Repository::open_in_memory().await.unwrap();
        let article = created(&repo, "https://news.example/c").await;

        let err = repo
            .apply(
                article.id,
                Transition::VideoGenerated {
                    video_url: "https://cdn.example/c.mp4".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        let stored = repo.find_by_id(article.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ArticleStatus::New);
        assert!(stored.video_url.is_none());
    }

    #[tokio::test]
    async fn unknown_article_is_reported() {
        let repo = Repository::open_in_memory().await.unwrap();
        let err = repo
            .apply(
                42,
                Transition::ExtractionFailed {
                    reason: "gone".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ArticleNotFound(42)));
        assert!(matches!(
            repo.record_render_job(42, "job").await,
            Err(AppError::ArticleNotFound(42))
        ));
    }

    #[tokio::test]
    async fn scraped_title_only_fills_an_empty_title() {
        let repo = Repository::open_in_memory().await.unwrap();
        let untitled = match repo
            .create(NewArticle {
                url: "https://news.example/untitled".into(),
                title: String::new(),
                published_at: None,
            })
            .await
            .unwrap()
        {
            CreateOutcome::Created(article) => article,
            CreateOutcome::Duplicate(_) => unreachable!(),
        };
        let titled = created(&repo, "https://news.example/titled").await;

        for id in [untitled.id, titled.id] {
            repo.apply(
                id,
                Transition::Extracted {
                    content: "text".into(),
                    title: Some("Page heading".into()),
                    resolved_url: None,
                },
            )
            .await
            .unwrap();
        }

        let untitled = repo.find_by_id(untitled.id).await.unwrap().unwrap();
        let titled = repo.find_by_id(titled.id).await.unwrap().unwrap();
        assert_eq!(untitled.title, "Page heading");
        assert_eq!(titled.title, "Title for https://news.example/titled");
    }

    #[tokio::test]
    async fn list_filters_by_status_newest_first() {
        let repo = Repository::open_in_memory().await.unwrap();
        let a = created(&repo, "https://news.example/1").await;
        let b = created(&repo, "https://news.example/2").await;
        let c = created(&repo, "https://news.example/3").await;
        for id in [a.id, c.id] {
            repo.apply(
                id,
                Transition::ExtractionFailed {
                    reason: "403".into(),
                },
            )
            .await
            .unwrap();
        }

        let failed = repo
            .list(&ArticleFilter::latest(10).with_status(ArticleStatus::ExtractionFailed))
            .await
            .unwrap();
        let ids: Vec<i64> = failed.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![c.id, a.id]);

        let newest = repo.list(&ArticleFilter::latest(1)).await.unwrap();
        assert_eq!(newest[0].id, c.id);
        assert_ne!(newest[0].id, b.id);
    }

    #[tokio::test]
    async fn extraction_records_the_resolved_url_beside_the_key() {
        let repo = Repository::open_in_memory().await.unwrap();
        let article = created(&repo, "https://news.google.com/rss/articles/CBMi").await;

        let extracted = repo
            .apply(
                article.id,
                Transition::Extracted {
                    content: "body".into(),
                    title: None,
                    resolved_url: Some("https://news.example/chips".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(extracted.url, "https://news.google.com/rss/articles/CBMi");
        assert_eq!(
            extracted.resolved_url.as_deref(),
            Some("https://news.example/chips")
        );
        assert!(repo
            .find_by_url("https://news.example/chips")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn committed_stages_survive_reopening_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.db");
        let path = path.to_string_lossy().to_string();

        let id = {
            let repo = Repository::new(&path).await.unwrap();
            let article = created(&repo, "https://news.example/durable").await;
            repo.apply(
                article.id,
                Transition::Extracted {
                    content: "persisted".into(),
                    title: None,
                    resolved_url: None,
                },
            )
            .await
            .unwrap();
            repo.record_render_job(article.id, "job-7").await.unwrap();
            article.id
        };

        let reopened = Repository::new(&path).await.unwrap();
        let article = reopened.find_by_url("https://news.example/durable").await.unwrap().unwrap();
        assert_eq!(article.id, id);
        assert_eq!(article.status, ArticleStatus::Extracted);
        assert_eq!(article.content.as_deref(), Some("persisted"));
        assert_eq!(article.render_job_id.as_deref(), Some("job-7"));
    }

    #[tokio::test]
    async fn opening_an_older_database_adds_the_resolved_url_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(&SCHEMA.replace("    resolved_url TEXT,\n", ""))
                .unwrap();
            conn.execute(
                "INSERT INTO articles (url, title) VALUES ('https://news.example/old', 'Old')",
                [],
            )
            .unwrap();
        }

        let repo = Repository::new(&path.to_string_lossy()).await.unwrap();
        let old = repo.find_by_url("https://news.example/old").await.unwrap().unwrap();
        assert!(old.resolved_url.is_none());
        assert_eq!(old.status, ArticleStatus::New);
    }
}
