use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;

use crate::error::{AppError, Result};

use super::{ExtractedPage, Extractor};

const USER_AGENT_STRING: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// html2text renders links as `[n]` markers plus a `[n]: url` footnote list.
static FOOTNOTE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d+\]:\s*\S+").expect("valid footnote regex"));
static FOOTNOTE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid marker regex"));
static TITLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Extractor for ContentFetcher {
    async fn extract(&self, url: &str) -> Result<ExtractedPage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| AppError::ExtractionFailed(format!("invalid url {url}: {e}")))?;

        let response = self.client.get(parsed).send().await?;
        let final_url = response.url().to_string();

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::debug!(url, status, "Article fetch rejected");
            return Err(AppError::Upstream {
                service: "article-host",
                status,
                message: format!("fetching {url}"),
            });
        }

        let html = response.text().await?;
        let page = extract_page(&html)
            .map_err(|e| AppError::ExtractionFailed(format!("unreadable page at {url}: {e}")))?;

        Ok(ExtractedPage {
            final_url: Some(final_url).filter(|u| u != url),
            ..page
        })
    }
}

/// Converts an HTML document into readable plain text plus its `<title>`.
pub(crate) fn extract_page(html: &str) -> std::result::Result<ExtractedPage, html2text::Error> {
    let text = html2text::from_read(html.as_bytes(), 100)?;

    let content = text
        .lines()
        .filter(|line| !FOOTNOTE_LINE.is_match(line.trim()))
        .map(|line| FOOTNOTE_MARKER.replace_all(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let title = TITLE_TAG
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    Ok(ExtractedPage {
        content,
        title,
        final_url: None,
    })
}
