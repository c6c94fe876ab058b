//! CLI argument parsing and subcommand dispatch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use carewatch_core::Config;
use carewatch_rules::loader::{load_paths, LoadStatus};
use carewatch_rules::schema::{condition_from_str, Condition};

use crate::router::build_router;
use crate::runner;
use crate::state::AppState;

/// Rule-based clinical alerting engine.
#[derive(Parser, Debug)]
#[command(name = "carewatch", version, about = "Rule-based clinical alerting engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (and the periodic evaluator when configured)
    Serve,
    /// Run one batch evaluation and print the report as JSON
    Evaluate,
    /// Evaluate a condition tree against one patient's metrics without writing anything
    TestRule {
        /// Patient UUID
        #[arg(long)]
        patient: Uuid,
        /// Condition tree file (.yml, .yaml or .json)
        #[arg(long)]
        condition: PathBuf,
    },
    /// Parse and validate rule files or directories of rule files
    Validate {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

pub async fn dispatch(cli: Cli, config: &Config) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve => serve(config).await,
        Command::Evaluate => evaluate(config).await,
        Command::TestRule { patient, condition } => test_rule(config, patient, &condition).await,
        Command::Validate { paths } => {
            validate(&paths)?;
            Ok(())
        }
    }
}

// ── Subcommands ──────────────────────────────────────────────────

async fn serve(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let _runner = runner::spawn(state.scheduler.clone(), config.engine.eval_interval_secs);
    let app = build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn evaluate(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let report = state
        .scheduler
        .evaluate_all()
        .await
        .context("batch evaluation failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn test_rule(config: &Config, patient: Uuid, condition_path: &Path) -> anyhow::Result<()> {
    let condition = read_condition(condition_path)?;
    let state = AppState::from_config(config).await?;
    let outcome = state.tester.test_rule(&condition, patient).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// Print one line per file; fails if any file failed to load.
/// Returns the number of valid rules.
pub fn validate(paths: &[PathBuf]) -> anyhow::Result<usize> {
    let results = load_paths(paths)?;
    let mut valid = 0;
    let mut failed = 0;
    for result in &results {
        match &result.status {
            LoadStatus::Loaded(draft) => {
                valid += 1;
                println!(
                    "ok      {} ({}, {})",
                    result.path.display(),
                    draft.name,
                    draft.scope
                );
            }
            LoadStatus::Skipped { reason } => {
                println!("skipped {} ({})", result.path.display(), reason);
            }
            LoadStatus::Failed { error } => {
                failed += 1;
                println!("FAILED  {}: {}", result.path.display(), error);
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} rule file(s) failed validation", valid + failed);
    }
    Ok(valid)
}

fn read_condition(path: &Path) -> anyhow::Result<Condition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read condition file {}", path.display()))?;
    let json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let condition = condition_from_str(&text, json)
        .with_context(|| format!("invalid condition tree in {}", path.display()))?;
    condition.validate()?;
    Ok(condition)
}
