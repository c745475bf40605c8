/// Database layer for the append-only checks store
///
/// The worker appends one row per (target, tick); the bot runs the aggregate
/// query. Both go through [`CheckStore`].
pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{CheckRecord, PingStat};
pub use repository::{CheckBatch, CheckRepository, CheckStore};

use std::time::Duration;

use libsql::Connection;
use tokio::time::timeout;

use crate::error::{StoreError, StoreResult};
use crate::pool::LibsqlManager;

/// Budget for the startup liveness check
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize database with schema
pub async fn initialize_database(conn: &Connection) -> StoreResult<()> {
    migrations::run_migrations(conn).await
}

/// Open the store behind `url`, verify it answers within [`CONNECT_TIMEOUT`],
/// and bring the schema up to date.
pub async fn open_store(url: &str) -> StoreResult<CheckRepository> {
    let db = libsql::Builder::new_local(url).build().await.map_err(StoreError::Open)?;
    let pool = deadpool::managed::Pool::builder(LibsqlManager::new(db)).build()?;
    let repository = CheckRepository::new_from_pool(pool.clone());

    check_liveness(&repository, CONNECT_TIMEOUT).await?;

    let conn = pool.get().await?;
    conn.query("PRAGMA journal_mode = WAL", ()).await?;
    initialize_database(&conn).await?;

    Ok(repository)
}

/// Fails with [`StoreError::Connect`] when `store` does not answer within `budget`.
pub async fn check_liveness(store: &dyn CheckStore, budget: Duration) -> StoreResult<()> {
    timeout(budget, store.ping()).await.map_err(|_| StoreError::Connect(budget))?
}
