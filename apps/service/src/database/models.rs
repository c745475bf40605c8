use chrono::{DateTime, Utc};
use std::net::{IpAddr, Ipv4Addr};

use crate::monitoring::types::{CheckKind, ProbeOutcome};

/// CheckRecord model - the durable row written once per (target, tick)
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRecord {
    /// UTC instant the record was taken
    pub ts: DateTime<Utc>,
    /// Target the probe ran against
    pub addr: String,
    /// Resolved IPv4 address; `None` when resolution failed
    pub ip4: Option<Ipv4Addr>,
    pub kind: CheckKind,
    pub success: bool,
    pub latency_ms: f64,
    /// 0 when no exchange completed
    pub http_code: u16,
    /// Empty on success
    pub err: String,
    /// Probe implementation that produced the row
    pub agent: String,
}

impl CheckRecord {
    /// Normalize a probe outcome into a record
    pub fn from_outcome(
        ts: DateTime<Utc>,
        outcome: ProbeOutcome,
        kind: CheckKind,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            ts,
            ip4: outcome.address.and_then(to_ipv4),
            kind,
            success: outcome.success(),
            latency_ms: outcome.latency_ms(),
            http_code: outcome.status_code.unwrap_or(0),
            err: outcome.error,
            addr: outcome.target,
            agent: agent.into(),
        }
    }
}

/// IPv4 form of an address, unwrapping IPv4-mapped IPv6
fn to_ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

/// Aggregated latency for one target, in milliseconds
#[derive(Debug, Clone, PartialEq)]
pub struct PingStat {
    pub addr: String,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}
