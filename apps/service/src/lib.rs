//! Pingomon - periodic HTTP latency probing with on-demand statistics
//!
//! The worker probes every configured target on a fixed tick and appends one
//! check record per target to the store. The bot answers `/stats` with
//! per-target latency aggregated over everything stored.

pub mod bot;
pub mod config;
pub mod database;
pub mod error;
pub mod monitoring;
pub mod pool;
pub mod shutdown;
pub mod stats;

pub use config::{Config, ConfigError};
pub use error::{StoreError, StoreResult};
