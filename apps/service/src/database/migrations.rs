use libsql::{Connection, TransactionBehavior};

use crate::error::StoreResult;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations
///
/// This is the single source of truth for the checks schema. The bot only
/// reads; the worker and the bot both run this at startup and it is a no-op
/// once the schema is current.
///
/// Runs under one write transaction: a concurrent starter waits on the lock
/// and then finds the schema current.
pub async fn run_migrations(conn: &Connection) -> StoreResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).await?;
    apply_pending(&tx).await?;
    tx.commit().await?;
    Ok(())
}

async fn apply_pending(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!(version = current_version, "database schema is up to date");
        return Ok(());
    }

    tracing::info!(from = current_version, to = SCHEMA_VERSION, "running migrations");

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Create checks table").await?;
    }

    Ok(())
}

async fn get_current_version(conn: &Connection) -> StoreResult<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> StoreResult<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!(version, description, "applied migration");
    Ok(())
}

/// Migration v1: append-only checks table, one row per (target, tick)
async fn run_migration_v1(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS checks (
            ts INTEGER NOT NULL,
            addr TEXT NOT NULL,
            ip4 TEXT,
            kind INTEGER NOT NULL,
            success INTEGER NOT NULL,
            latency_ms REAL NOT NULL,
            http_code INTEGER NOT NULL DEFAULT 0,
            err TEXT NOT NULL DEFAULT '',
            agent TEXT NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_checks_addr_ts ON checks(addr, ts)", ()).await?;

    Ok(())
}
