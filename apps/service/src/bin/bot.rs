use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, info_span};

use pingomon::Config;
use pingomon::bot::{CommandHandler, TelegramTransport, run_bot_in};
use pingomon::database::open_store;
use pingomon::shutdown::shutdown_signal;

/// Answer `/stats` requests with latency statistics from the store
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
            error!(error = %format!("{e:#}"), "bot failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env(cli.env_file.as_deref()).context("failed to load config")?;

    let store = open_store(&config.database_url).await.context("failed to connect to store")?;
    info!(database = %config.database_url, "connected to store");

    let transport =
        TelegramTransport::new(&config.telegram_bot_token).context("failed to build bot client")?;
    let username = transport.authorize().await.context("telegram bot init")?;
    info!(username = %username, "bot authorized");

    let handler = CommandHandler::new(Arc::new(store));
    run_bot_in(&transport, &handler, shutdown_signal(), info_span!("bot", username = %username))
        .await;

    Ok(())
}
