use std::net::IpAddr;
use std::time::Duration;

/// Kind of probe that produced a record, stored as a small integer tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum CheckKind {
    Http = 2,
}

impl CheckKind {
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    #[cfg(test)]
    pub(crate) fn from_i8(tag: i8) -> Option<Self> {
        match tag {
            2 => Some(CheckKind::Http),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Http => write!(f, "http"),
        }
    }
}

/// Normalized result of a single probe attempt against one target.
///
/// Produced once per (target, tick) and handed straight to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// URL or target that was checked
    pub target: String,

    /// Status code of a completed exchange; `None` on transport failure
    pub status_code: Option<u16>,

    /// Wall-clock span of the attempt, up to the response or the failure
    pub duration: Duration,

    /// Transport error text; empty when the exchange completed
    pub error: String,

    /// Resolved address, when resolution succeeded
    pub address: Option<IpAddr>,
}

impl ProbeOutcome {
    /// A completed request/response exchange. Any status code counts.
    pub fn completed(target: impl Into<String>, status_code: u16, duration: Duration) -> Self {
        Self {
            target: target.into(),
            status_code: Some(status_code),
            duration,
            error: String::new(),
            address: None,
        }
    }

    /// A transport-level failure
    pub fn failed(target: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error.push_str("transport error");
        }

        Self { target: target.into(), status_code: None, duration, error, address: None }
    }

    pub fn with_address(mut self, address: Option<IpAddr>) -> Self {
        self.address = address;
        self
    }

    /// Success means no transport-level error occurred.
    pub fn success(&self) -> bool {
        self.error.is_empty()
    }

    pub fn latency_ms(&self) -> f64 {
        self.duration.as_nanos() as f64 / 1_000_000.0
    }
}
