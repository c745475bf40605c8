use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, info_span};

use pingomon::Config;
use pingomon::database::open_store;
use pingomon::monitoring::{HttpChecker, MonitoringScheduler, SystemResolver};
use pingomon::shutdown::shutdown_signal;

/// Probe every configured target on a fixed interval and record the results
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Load settings from this env file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logger::init_tracing() {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "ping worker failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env(cli.env_file.as_deref()).context("failed to load config")?;
    info!("{config}");

    let store = open_store(&config.database_url).await.context("failed to connect to store")?;
    info!(database = %config.database_url, "connected to store");

    let checker = HttpChecker::new(config.interval()).context("failed to build HTTP client")?;

    let scheduler = MonitoringScheduler::new(
        Arc::new(checker),
        Arc::new(SystemResolver),
        Arc::new(store),
        config.targets.clone(),
        config.interval(),
    )
    .with_span(info_span!("ping_worker", agent = HttpChecker::AGENT));

    scheduler.run(shutdown_signal()).await;
    Ok(())
}
