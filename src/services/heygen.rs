use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::config::HeyGenConfig;
use crate::error::{AppError, Result};
use crate::models::{JobStatus, RenderJob};

use super::VideoRenderer;

const GENERATE_PATH: &str = "/v2/video/generate";
const STATUS_PATH: &str = "/v1/video_status.get";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    caption: bool,
    video_inputs: Vec<VideoInput<'a>>,
    dimension: Dimension,
}

#[derive(Debug, Serialize)]
struct VideoInput<'a> {
    character: Character<'a>,
    voice: Voice<'a>,
    background: Background<'a>,
}

#[derive(Debug, Serialize)]
struct Character<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    avatar_id: &'a str,
    avatar_style: &'static str,
}

#[derive(Debug, Serialize)]
struct Voice<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    input_text: &'a str,
    voice_id: &'a str,
}

#[derive(Debug, Serialize)]
struct Background<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct Dimension {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateData {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: String,
    video_url: Option<String>,
    error: Option<serde_json::Value>,
}

pub struct HeyGenRenderer {
    client: Client,
    api_key: String,
    avatar_id: String,
    default_voice: Option<String>,
    config: HeyGenConfig,
}

impl HeyGenRenderer {
    pub fn new(config: HeyGenConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Config("heygen.api_key (or HEYGEN_API_KEY) is not set".into()))?;
        let avatar_id = config.avatar_id.clone().ok_or_else(|| {
            AppError::Config("heygen.avatar_id (or HEYGEN_AVATAR_ID) is not set".into())
        })?;

        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            api_key,
            avatar_id,
            default_voice: config.voice_id.clone(),
            config,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        Err(AppError::Upstream {
            service: "heygen",
            status,
            message: response.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl VideoRenderer for HeyGenRenderer {
    async fn start(&self, script: &str, voice: Option<&str>) -> Result<RenderJob> {
        let voice_id = voice
            .or(self.default_voice.as_deref())
            .ok_or_else(|| AppError::Config("no voice selected and heygen.voice_id is not set".into()))?;

        let request = GenerateRequest {
            caption: false,
            video_inputs: vec![VideoInput {
                character: Character {
                    kind: "avatar",
                    avatar_id: &self.avatar_id,
                    avatar_style: "normal",
                },
                voice: Voice {
                    kind: "text",
                    input_text: script,
                    voice_id,
                },
                background: Background {
                    kind: "color",
                    value: &self.config.background,
                },
            }],
            dimension: Dimension {
                width: self.config.width,
                height: self.config.height,
            },
        };

        let response = self
            .client
            .post(self.endpoint(GENERATE_PATH))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let envelope: Envelope<GenerateData> = Self::check(response).await?.json().await?;

        let video_id = envelope.data.and_then(|d| d.video_id).ok_or_else(|| {
            AppError::RenderFailed(format!(
                "provider accepted the request without a video id ({})",
                envelope.error.map(|e| e.to_string()).unwrap_or_default()
            ))
        })?;

        tracing::info!(job_id = %video_id, "Video job created");
        Ok(RenderJob::new(video_id))
    }

    async fn status(&self, job: &RenderJob) -> Result<JobStatus> {
        let response = self
            .client
            .get(self.endpoint(STATUS_PATH))
            .query(&[("video_id", job.id.as_str())])
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        let envelope: Envelope<StatusData> = Self::check(response).await?.json().await?;

        let data = envelope
            .data
            .ok_or_else(|| AppError::RenderFailed(format!("no status returned for job {}", job.id)))?;
        Ok(status_from(data))
    }
}

fn status_from(data: StatusData) -> JobStatus {
    match data.status.as_str() {
        "completed" => match data.video_url {
            Some(video_url) => JobStatus::Done { video_url },
            None => JobStatus::Failed {
                reason: "job completed without a video url".into(),
            },
        },
        "failed" => JobStatus::Failed {
            reason: data
                .error
                .map(|e| match e {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "provider reported failure".into()),
        },
        _ => JobStatus::Pending,
    }
}
