//! Best-effort host resolution used to enrich stored records.
//!
//! A failed lookup never gates a probe: callers get `None` and carry on.

use anyhow::{Result, anyhow};
use std::net::IpAddr;
use url::Url;

#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    /// First address the target's host resolves to, if any
    async fn resolve(&self, target: &str) -> Option<IpAddr>;
}

/// Resolves through the operating system's resolver
#[derive(Debug, Default, Clone)]
pub struct SystemResolver;

#[async_trait::async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, target: &str) -> Option<IpAddr> {
        match lookup(target).await {
            Ok(ip) => {
                tracing::debug!(url = target, %ip, "resolved host");
                Some(ip)
            }
            Err(e) => {
                tracing::warn!(url = target, error = %e, "failed to resolve");
                None
            }
        }
    }
}

async fn lookup(target: &str) -> Result<IpAddr> {
    let host = target_host(target)?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((host.as_str(), 0))
        .await
        .map_err(|e| anyhow!("lookup ip: {}", e))?;

    addrs.next().map(|addr| addr.ip()).ok_or_else(|| anyhow!("no IPs found for host: {}", host))
}

/// Host portion of a target URL, without port or IPv6 brackets.
pub fn target_host(target: &str) -> Result<String> {
    let url = Url::parse(target).map_err(|e| anyhow!("parse url: {}", e))?;
    let host = url.host_str().ok_or_else(|| anyhow!("url has no host: {}", target))?;

    Ok(host.trim_start_matches('[').trim_end_matches(']').to_string())
}
