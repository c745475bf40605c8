use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;

use super::{BotTransport, IncomingMessage, ParseMode, Reply};

const API_BASE: &str = "https://api.telegram.org";

/// Seconds the server holds a `getUpdates` call open
const LONG_POLL_SECONDS: u64 = 30;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("telegram api error: {0}")]
    Api(String),
}

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TransportError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TransportError::Api(
                self.description.unwrap_or_else(|| "request was not ok".to_string()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
    #[serde(default)]
    first_name: String,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

/// Long-polling transport over the Telegram Bot API.
pub struct TelegramTransport {
    client: Client,
    base_url: String,
    offset: AtomicI64,
}

impl TelegramTransport {
    pub fn new(bot_token: &str) -> Result<Self, TransportError> {
        Self::with_base_url(API_BASE, bot_token)
    }

    pub fn with_base_url(api_base: &str, bot_token: &str) -> Result<Self, TransportError> {
        // Must outlive the server-side long poll
        let client = Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECONDS + 10))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{bot_token}", api_base.trim_end_matches('/')),
            offset: AtomicI64::new(0),
        })
    }

    /// Username the token belongs to; fails when the token is rejected.
    pub async fn authorize(&self) -> Result<String, TransportError> {
        let me: User = self
            .client
            .get(format!("{}/getMe", self.base_url))
            .send()
            .await?
            .json::<ApiResponse<User>>()
            .await?
            .into_result()?;

        Ok(me.username.unwrap_or(me.first_name))
    }
}

/// Inbound text messages in `updates`, plus the offset that acknowledges them.
fn extract_messages(updates: Vec<Update>, current_offset: i64) -> (Vec<IncomingMessage>, i64) {
    let mut offset = current_offset;
    let mut messages = Vec::new();

    for update in updates {
        offset = offset.max(update.update_id + 1);

        let Some(message) = update.message else {
            continue;
        };
        let Some(text) = message.text else {
            continue;
        };

        let requester = match message.from {
            Some(User { username: Some(username), .. }) => username,
            Some(User { id, .. }) => id.to_string(),
            None => message.chat.id.to_string(),
        };

        messages.push(IncomingMessage { chat_id: message.chat.id, requester, text });
    }

    (messages, offset)
}

#[async_trait]
impl BotTransport for TelegramTransport {
    async fn poll(&self) -> Result<Vec<IncomingMessage>, TransportError> {
        let current = self.offset.load(Ordering::Acquire);
        let request = GetUpdates {
            offset: current,
            timeout: LONG_POLL_SECONDS,
            allowed_updates: &["message"],
        };

        let updates: Vec<Update> = self
            .client
            .post(format!("{}/getUpdates", self.base_url))
            .json(&request)
            .send()
            .await?
            .json::<ApiResponse<Vec<Update>>>()
            .await?
            .into_result()?;

        let (messages, next) = extract_messages(updates, current);
        self.offset.fetch_max(next, Ordering::AcqRel);
        Ok(messages)
    }

    async fn send(&self, reply: &Reply) -> Result<(), TransportError> {
        let payload = SendMessage {
            chat_id: reply.chat_id,
            text: &reply.text,
            parse_mode: match reply.parse_mode {
                ParseMode::Plain => None,
                ParseMode::Markdown => Some("Markdown"),
            },
        };

        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse<serde_json::Value> = response.json().await?;
        if !status.is_success() || !body.ok {
            return Err(TransportError::Api(format!(
                "sendMessage returned {status}: {}",
                body.description.unwrap_or_default()
            )));
        }

        Ok(())
    }
}
