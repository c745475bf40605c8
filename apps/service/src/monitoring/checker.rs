use anyhow::Result;
use std::error::Error as StdError;
use std::time::{Duration, Instant};

use super::types::{CheckKind, ProbeOutcome};

/// Checker trait for the probe kinds a worker can run.
///
/// Implementations make exactly one attempt per call and never fail: transport
/// problems are reported inside the returned [`ProbeOutcome`].
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Tag stored with every record this checker produces
    fn kind(&self) -> CheckKind;

    /// Identifies the probe implementation in stored records
    fn agent(&self) -> &str;

    /// Perform one check against `target`
    async fn check(&self, target: &str) -> ProbeOutcome;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub const AGENT: &'static str = "reqwest";

    /// `timeout` bounds a whole attempt, connect through body.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::Http
    }

    fn agent(&self) -> &str {
        Self::AGENT
    }

    async fn check(&self, target: &str) -> ProbeOutcome {
        let start = Instant::now();

        let response = match self.client.get(target).send().await {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::failed(target, error_chain(&e), start.elapsed()),
        };

        let status_code = response.status().as_u16();

        // The exchange is complete only once the body has arrived
        if let Err(e) = response.bytes().await {
            return ProbeOutcome::failed(target, error_chain(&e), start.elapsed());
        }

        ProbeOutcome::completed(target, status_code, start.elapsed())
    }
}

/// Render an error with its sources, outermost first.
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
