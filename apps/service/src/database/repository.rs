use async_trait::async_trait;
use libsql::{Statement, Transaction, params};

use super::models::{CheckRecord, PingStat};
use crate::error::{PooledConnection, StoreError, StoreResult};
use crate::pool::LibsqlPool;

const INSERT_CHECK: &str = "INSERT INTO checks (ts, addr, ip4, kind, success, latency_ms, http_code, err, agent) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

const PING_STATS: &str = "SELECT addr, AVG(latency_ms), MIN(latency_ms), MAX(latency_ms) FROM checks GROUP BY addr ORDER BY AVG(latency_ms) ASC, addr ASC";

/// Store contract shared by the worker (writes) and the bot (reads).
///
/// Safe for concurrent use by many writers at once.
#[async_trait]
pub trait CheckStore: Send + Sync {
    /// Liveness check
    async fn ping(&self) -> StoreResult<()>;

    /// Append one record. Errors are returned as-is, never retried.
    async fn insert_check(&self, record: &CheckRecord) -> StoreResult<()>;

    /// Mean/min/max latency per target over every stored record, fastest first
    async fn ping_stats(&self) -> StoreResult<Vec<PingStat>>;
}

/// LibSQL-backed check store
pub struct CheckRepository {
    pool: LibsqlPool,
}

impl CheckRepository {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> StoreResult<PooledConnection> {
        Ok(self.pool.get().await?)
    }

    /// Start a write batch on a pooled connection
    pub async fn prepare_batch(&self) -> StoreResult<CheckBatch> {
        let conn = self.get_conn().await?;
        CheckBatch::prepare(conn).await
    }
}

/// Prepared insert inside a transaction: `append` rows, then `send` commits
/// them all at once. Dropping a batch without sending rolls it back.
pub struct CheckBatch {
    statement: Statement,
    transaction: Transaction,
    rows: usize,
    _conn: PooledConnection,
}

impl CheckBatch {
    async fn prepare(conn: PooledConnection) -> StoreResult<Self> {
        let transaction = conn.transaction().await?;
        let statement = transaction.prepare(INSERT_CHECK).await?;

        Ok(Self { statement, transaction, rows: 0, _conn: conn })
    }

    pub async fn append(&mut self, record: &CheckRecord) -> StoreResult<()> {
        self.statement
            .execute(params![
                record.ts.timestamp_millis(),
                record.addr.clone(),
                record.ip4.map(|ip| ip.to_string()),
                record.kind.as_i8() as i64,
                if record.success { 1 } else { 0 },
                record.latency_ms,
                record.http_code as i64,
                record.err.clone(),
                record.agent.clone()
            ])
            .await?;
        self.statement.reset();
        self.rows += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Commit every appended row
    pub async fn send(self) -> StoreResult<usize> {
        let Self { statement, transaction, rows, _conn } = self;
        drop(statement);
        transaction.commit().await?;
        Ok(rows)
    }
}

#[async_trait]
impl CheckStore for CheckRepository {
    async fn ping(&self) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT 1", ()).await?;
        rows.next().await?.ok_or_else(|| StoreError::Decode("liveness query returned no rows".into()))?;
        Ok(())
    }

    async fn insert_check(&self, record: &CheckRecord) -> StoreResult<()> {
        let mut batch = self.prepare_batch().await?;
        batch.append(record).await?;
        batch.send().await?;
        Ok(())
    }

    async fn ping_stats(&self) -> StoreResult<Vec<PingStat>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(PING_STATS, ()).await?;
        let mut stats = Vec::new();

        while let Some(row) = rows.next().await? {
            stats.push(PingStat {
                addr: row.get(0)?,
                avg: row.get(1)?,
                min: row.get(2)?,
                max: row.get(3)?,
            });
        }

        Ok(stats)
    }
}

#[cfg(test)]
impl CheckRepository {
    /// Most recent records for one target, newest first
    pub(crate) async fn recent_checks(&self, addr: &str, limit: usize) -> StoreResult<Vec<CheckRecord>> {
        use crate::monitoring::types::CheckKind;

        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare("SELECT ts, addr, ip4, kind, success, latency_ms, http_code, err, agent FROM checks WHERE addr = ? ORDER BY ts DESC LIMIT ?")
            .await?;

        let mut rows = stmt.query(params![addr.to_string(), limit as i64]).await?;
        let mut records = Vec::new();

        while let Some(row) = rows.next().await? {
            let ts: i64 = row.get(0)?;
            let ip4: Option<String> = row.get(2)?;
            let kind: i64 = row.get(3)?;

            records.push(CheckRecord {
                ts: chrono::DateTime::from_timestamp_millis(ts)
                    .ok_or_else(|| StoreError::Decode(format!("timestamp out of range: {ts}")))?,
                addr: row.get(1)?,
                ip4: ip4
                    .map(|ip| ip.parse::<std::net::Ipv4Addr>())
                    .transpose()
                    .map_err(|e| StoreError::Decode(format!("ip4: {e}")))?,
                kind: i8::try_from(kind)
                    .ok()
                    .and_then(CheckKind::from_i8)
                    .ok_or_else(|| StoreError::Decode(format!("unknown check kind: {kind}")))?,
                success: row.get::<i64>(4)? != 0,
                latency_ms: row.get(5)?,
                http_code: u16::try_from(row.get::<i64>(6)?)
                    .map_err(|e| StoreError::Decode(format!("http_code: {e}")))?,
                err: row.get(7)?,
                agent: row.get(8)?,
            });
        }

        Ok(records)
    }
}
