mod api;
mod cli;
mod router;
mod runner;
mod state;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

/// Worker stack size. Request bodies holding maximum-depth condition trees
/// are parsed recursively on these threads.
const WORKER_STACK_BYTES: usize = 8 * 1024 * 1024;

fn main() -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(WORKER_STACK_BYTES)
        .build()?
        .block_on(run())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    carewatch_core::config::load_dotenv();
    let config = carewatch_core::Config::from_env();
    config.log_summary();

    cli::dispatch(cli, &config).await
}
