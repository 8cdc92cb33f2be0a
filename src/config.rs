use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub heygen: HeyGenConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub language: String,
    pub country: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://news.google.com".to_string(),
            language: "en".to_string(),
            country: "US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_input_chars: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-nano".to_string(),
            temperature: 0.1,
            max_input_chars: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeyGenConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub avatar_id: Option<String>,
    pub voice_id: Option<String>,
    pub width: u32,
    pub height: u32,
    pub background: String,
}

impl Default for HeyGenConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.heygen.com".to_string(),
            avatar_id: None,
            voice_id: None,
            width: 1280,
            height: 720,
            background: "#FFFFFF".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Candidates processed in parallel during a run.
    pub concurrency: usize,
    /// Extracted text shorter than this is treated as a failed extraction.
    pub min_content_chars: usize,
    pub max_content_chars: usize,
    pub run_deadline_secs: u64,
    pub retry: RetryConfig,
    pub render: RenderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            min_content_chars: 200,
            max_content_chars: 10_000,
            run_deadline_secs: 600,
            retry: RetryConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            timeout_secs: 300,
        }
    }
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("newscast");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("articles.db").to_string_lossy().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            search: SearchConfig::default(),
            openai: OpenAiConfig::default(),
            heygen: HeyGenConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config from `path` (or the default location), writing a default
    /// file when none exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            config
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("newscast")
            .join("config.toml")
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("NEWSCAST_DB_PATH") {
            self.db_path = path;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.openai.model = model;
        }
        if let Some(key) = lookup("HEYGEN_API_KEY") {
            self.heygen.api_key = Some(key);
        }
        if let Some(avatar) = lookup("HEYGEN_AVATAR_ID") {
            self.heygen.avatar_id = Some(avatar);
        }
        if let Some(voice) = lookup("HEYGEN_VOICE_ID") {
            self.heygen.voice_id = Some(voice);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.concurrency == 0 {
            return Err(AppError::Config("pipeline.concurrency must be at least 1".into()));
        }
        if self.pipeline.retry.max_attempts == 0 {
            return Err(AppError::Config("pipeline.retry.max_attempts must be at least 1".into()));
        }
        if self.pipeline.render.poll_interval_secs == 0 {
            return Err(AppError::Config(
                "pipeline.render.poll_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
