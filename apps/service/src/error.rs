use std::time::Duration;

use thiserror::Error;

use crate::pool::LibsqlManager;

/// Failures talking to the check store.
///
/// None of these are retried by the store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("open database: {0}")]
    Open(#[source] libsql::Error),
    #[error("store did not answer within {0:?}")]
    Connect(Duration),
    #[error("build connection pool: {0}")]
    PoolBuild(#[from] deadpool::managed::BuildError),
    #[error("acquire connection: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),
    #[error("{0}")]
    Query(#[from] libsql::Error),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("decode row: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) type PooledConnection = deadpool::managed::Object<LibsqlManager>;
