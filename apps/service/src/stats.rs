//! On-demand latency statistics over every stored check.
//!
//! Nothing is cached: each query aggregates the store afresh.

use std::fmt::Write;
use std::time::Duration;

use tokio::time::timeout;

use crate::database::{CheckStore, PingStat};
use crate::error::{StoreError, StoreResult};

/// Budget for one interactive stats query
pub const STATS_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

pub const NO_DATA_MESSAGE: &str = "No ping data yet 📭";

/// Per-target mean/min/max latency, fastest target first.
///
/// Fails with [`StoreError::Timeout`] when the store does not answer within
/// `budget`. An empty store yields an empty list.
pub async fn query_stats(store: &dyn CheckStore, budget: Duration) -> StoreResult<Vec<PingStat>> {
    timeout(budget, store.ping_stats()).await.map_err(|_| StoreError::Timeout(budget))?
}

/// Render statistics as a Markdown reply
pub fn format_stats(stats: &[PingStat]) -> String {
    if stats.is_empty() {
        return NO_DATA_MESSAGE.to_string();
    }

    let mut message = String::from("📊 *Ping statistics:*\n");
    for stat in stats {
        let _ = writeln!(
            message,
            "• `{}`\n  avg: *{:.2} ms* | min: {:.2} | max: {:.2}",
            stat.addr, stat.avg, stat.min, stat.max
        );
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::CheckRecord;
    use crate::database::repository::tests::create_test_store;
    use crate::monitoring::types::CheckKind;
    use chrono::Utc;

    struct StalledStore;

    #[async_trait::async_trait]
    impl CheckStore for StalledStore {
        async fn ping(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn insert_check(&self, _record: &CheckRecord) -> StoreResult<()> {
            Ok(())
        }

        async fn ping_stats(&self) -> StoreResult<Vec<PingStat>> {
            std::future::pending().await
        }
    }

    fn record(addr: &str, latency_ms: f64) -> CheckRecord {
        CheckRecord {
            ts: Utc::now(),
            addr: addr.to_string(),
            ip4: None,
            kind: CheckKind::Http,
            success: true,
            latency_ms,
            http_code: 200,
            err: String::new(),
            agent: "reqwest".to_string(),
        }
    }

    #[tokio::test]
    async fn test_aggregates_latencies() {
        let (store, _dir) = create_test_store().await;
        for latency in [10.0, 20.0, 30.0] {
            store.insert_check(&record("A", latency)).await.unwrap();
        }

        let stats = query_stats(&store, STATS_QUERY_TIMEOUT).await.unwrap();

        assert_eq!(stats.len(), 1);
        assert_eq!(format!("{:.2}", stats[0].avg), "20.00");
        assert_eq!(format!("{:.2}", stats[0].min), "10.00");
        assert_eq!(format!("{:.2}", stats[0].max), "30.00");
    }

    #[tokio::test]
    async fn test_repeated_queries_are_identical() {
        let (store, _dir) = create_test_store().await;
        store.insert_check(&record("A", 12.345)).await.unwrap();
        store.insert_check(&record("B", 3.0)).await.unwrap();

        let first = format_stats(&query_stats(&store, STATS_QUERY_TIMEOUT).await.unwrap());
        let second = format_stats(&query_stats(&store, STATS_QUERY_TIMEOUT).await.unwrap());

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_store_renders_no_data() {
        let (store, _dir) = create_test_store().await;

        let stats = query_stats(&store, STATS_QUERY_TIMEOUT).await.unwrap();

        assert!(stats.is_empty());
        assert_eq!(format_stats(&stats), NO_DATA_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let result = query_stats(&StalledStore, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(StoreError::Timeout(budget)) if budget == Duration::from_secs(5)));
    }

    #[test]
    fn test_format_stats() {
        let stats = vec![
            PingStat { addr: "https://fast.test".into(), avg: 4.0, min: 1.234, max: 9.999 },
            PingStat { addr: "https://slow.test".into(), avg: 250.5, min: 200.0, max: 301.0 },
        ];

        assert_eq!(
            format_stats(&stats),
            "📊 *Ping statistics:*\n\
             • `https://fast.test`\n  avg: *4.00 ms* | min: 1.23 | max: 10.00\n\
             • `https://slow.test`\n  avg: *250.50 ms* | min: 200.00 | max: 301.00\n"
        );
    }
}
