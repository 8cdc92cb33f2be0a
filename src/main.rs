use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use newscast::cli::{Cli, Command};
use newscast::config::Config;
use newscast::db::Repository;
use newscast::error::Result;
use newscast::models::ArticleFilter;
use newscast::pipeline::PipelineOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let store = Arc::new(Repository::new(&config.db_path).await?);
    let orchestrator = PipelineOrchestrator::new(
        store,
        cli.command.collaborators(&config)?,
        config.pipeline.clone(),
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing up");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::Run { topic, limit } => {
            print_json(&orchestrator.run_until(&topic, limit, &cancel).await?)
        }
        Command::Resume { limit } => print_json(&orchestrator.resume_until(limit, &cancel).await?),
        Command::Render { id, voice } => print_json(
            &orchestrator
                .render_until(id, voice.as_deref(), &cancel)
                .await?,
        ),
        Command::List { limit, status } => print_json(
            &orchestrator
                .list(&ArticleFilter {
                    statuses: status,
                    limit,
                })
                .await?,
        ),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
