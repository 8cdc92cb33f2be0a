use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::error::{AppError, Result};
use crate::utils::truncate_chars;

use super::Summarizer;

const SUMMARY_SYSTEM_PROMPT: &str = r#"You summarize news articles for a newsroom.
Write at most five sentences in neutral, factual language.
Keep the main facts and any key numbers. Do not add opinions."#;

const SCRIPT_SYSTEM_PROMPT: &str = r#"You write copy for a television news anchor.
Given a headline and a summary, write a spoken script for a 30-45 second read (about 80-120 words).
Tone: professional, conversational, neutral.
Open with a short headline line, follow with two short paragraphs, and close with one sentence.
Return only the words to be spoken."#;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiSummarizer {
    client: Client,
    api_key: String,
    config: OpenAiConfig,
}

impl OpenAiSummarizer {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Config("openai.api_key (or OPENAI_API_KEY) is not set".into()))?;
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    pub fn model_version(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system: &str, user: String) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: vec![
                Message {
                    role: "system",
                    content: system.to_string(),
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await?;
            return Err(AppError::Upstream {
                service: "openai",
                status,
                message: error_text,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let text = chat
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .collect::<Vec<_>>()
            .join("\n");

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::SummarizationFailed(
                "model returned an empty completion".into(),
            ));
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn condense(&self, _title: &str, content: &str) -> Result<String> {
        let content = truncate_chars(content, self.config.max_input_chars);
        let summary = self
            .complete(
                SUMMARY_SYSTEM_PROMPT,
                format!("Article:\n{content}\n\nSummary:"),
            )
            .await?;

        tracing::debug!(model = self.model_version(), summary_chars = summary.len(), "Generated summary");
        Ok(summary)
    }

    async fn write_script(&self, title: &str, summary: &str) -> Result<String> {
        let headline = if title.trim().is_empty() {
            "Untitled story"
        } else {
            title
        };
        let script = self
            .complete(
                SCRIPT_SYSTEM_PROMPT,
                format!("HEADLINE: {headline}\n\nSUMMARY: {summary}\n\nSCRIPT:"),
            )
            .await?;

        tracing::debug!(model = self.model_version(), script_chars = script.len(), "Generated script");
        Ok(script)
    }
}
