use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::ai::OpenAiSummarizer;
use crate::config::Config;
use crate::error::Result;
use crate::models::ArticleStatus;
use crate::pipeline::Collaborators;
use crate::services::{ContentFetcher, Disabled, GoogleNewsSearch, HeyGenRenderer};

/// Turns news search results into anchor scripts and avatar videos.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(short, long, global = true, env = "NEWSCAST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Search for a topic and take new articles as far as a ready script
    Run {
        #[arg(short, long, default_value = "technology")]
        topic: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Retry articles that stopped before a ready script
    Resume {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Render an article's script into an avatar video
    Render {
        /// Article id as shown by `list`
        id: i64,

        /// Voice to use instead of the configured default
        #[arg(long)]
        voice: Option<String>,
    },

    /// Show stored articles, newest first
    List {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        /// Only show articles in this status (repeatable)
        #[arg(short, long)]
        status: Vec<ArticleStatus>,
    },
}

impl Command {
    /// Builds the collaborators this command talks to. The rest are disabled, so
    /// only the credentials the command actually needs have to be configured.
    pub fn collaborators(&self, config: &Config) -> Result<Collaborators> {
        let collaborators = match self {
            Command::Run { .. } | Command::Resume { .. } => Collaborators {
                discovery: Arc::new(GoogleNewsSearch::new(config.search.clone())?),
                extractor: Arc::new(ContentFetcher::new()?),
                summarizer: Arc::new(OpenAiSummarizer::new(config.openai.clone())?),
                renderer: Arc::new(Disabled::new("video renderer")),
            },
            Command::Render { .. } => Collaborators {
                discovery: Arc::new(Disabled::new("news search")),
                extractor: Arc::new(Disabled::new("article extractor")),
                summarizer: Arc::new(Disabled::new("summarizer")),
                renderer: Arc::new(HeyGenRenderer::new(config.heygen.clone())?),
            },
            Command::List { .. } => Collaborators {
                discovery: Arc::new(Disabled::new("news search")),
                extractor: Arc::new(Disabled::new("article extractor")),
                summarizer: Arc::new(Disabled::new("summarizer")),
                renderer: Arc::new(Disabled::new("video renderer")),
            },
        };
        Ok(collaborators)
    }
}
