/// Inbound command interface
///
/// One request kind is understood (`/stats`); anything else gets the help
/// text. The transport is pluggable behind [`BotTransport`].
pub mod telegram;

pub use telegram::{TelegramTransport, TransportError};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::database::CheckStore;
use crate::stats::{STATS_QUERY_TIMEOUT, format_stats, query_stats};

pub const HELP_MESSAGE: &str = "ℹ️ Available commands:\n/stats — show ping statistics";

/// Pause after a failed poll before trying again
const POLL_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stats,
    Help,
}

impl Command {
    /// `/stats`, `/stats@SomeBot` and `/stats extra words` all mean stats.
    pub fn parse(text: &str) -> Self {
        let Some(first) = text.split_whitespace().next() else {
            return Command::Help;
        };
        let Some(command) = first.strip_prefix('/') else {
            return Command::Help;
        };
        let name = command.split('@').next().unwrap_or_default();

        if name.eq_ignore_ascii_case("stats") { Command::Stats } else { Command::Help }
    }
}

/// A request from someone talking to the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    /// Who sent it, for logs
    pub requester: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Plain,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
    pub parse_mode: ParseMode,
}

/// Receives requests and delivers replies
#[async_trait]
pub trait BotTransport: Send + Sync {
    /// Wait for the next batch of inbound messages
    async fn poll(&self) -> Result<Vec<IncomingMessage>, TransportError>;

    async fn send(&self, reply: &Reply) -> Result<(), TransportError>;
}

/// Maps inbound commands to replies
pub struct CommandHandler {
    store: Arc<dyn CheckStore>,
    query_timeout: Duration,
}

impl CommandHandler {
    pub fn new(store: Arc<dyn CheckStore>) -> Self {
        Self { store, query_timeout: STATS_QUERY_TIMEOUT }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub async fn handle(&self, message: &IncomingMessage) -> Reply {
        info!(user = %message.requester, text = %message.text, "received command");

        match Command::parse(&message.text) {
            Command::Stats => match query_stats(self.store.as_ref(), self.query_timeout).await {
                Ok(stats) => {
                    info!(user = %message.requester, targets = stats.len(), "sent stats");
                    Reply {
                        chat_id: message.chat_id,
                        text: format_stats(&stats),
                        parse_mode: ParseMode::Markdown,
                    }
                }
                Err(e) => {
                    error!(user = %message.requester, error = %e, "query error");
                    Reply {
                        chat_id: message.chat_id,
                        text: format!("❌ Query error: {e}"),
                        parse_mode: ParseMode::Plain,
                    }
                }
            },
            Command::Help => Reply {
                chat_id: message.chat_id,
                text: HELP_MESSAGE.to_string(),
                parse_mode: ParseMode::Plain,
            },
        }
    }
}

/// Serve requests until `shutdown` flips to `true`.
///
/// Poll and send failures are logged; neither ends the loop.
pub async fn run_bot(
    transport: &dyn BotTransport,
    handler: &CommandHandler,
    shutdown: watch::Receiver<bool>,
) {
    run_bot_in(transport, handler, shutdown, info_span!("bot")).await
}

pub async fn run_bot_in(
    transport: &dyn BotTransport,
    handler: &CommandHandler,
    mut shutdown: watch::Receiver<bool>,
    span: Span,
) {
    async move {
        info!("bot started");

        while !*shutdown.borrow_and_update() {
            let messages = tokio::select! {
                polled = transport.poll() => polled,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let messages = match messages {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(error = %e, "poll failed");
                    tokio::select! {
                        _ = tokio::time::sleep(POLL_BACKOFF) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    continue;
                }
            };

            for message in messages {
                let reply = handler.handle(&message).await;
                if let Err(e) = transport.send(&reply).await {
                    error!(user = %message.requester, error = %e, "failed to send reply");
                }
            }
        }

        info!("bot stopped");
    }
    .instrument(span)
    .await
}
