/// Monitoring engine module - probes targets and feeds the check store
///
/// This module is responsible for:
/// - Executing HTTP checks behind the [`Checker`] capability
/// - Best-effort resolution of each target's address
/// - Scheduling one concurrent check per target on every tick
pub mod checker;
pub mod resolver;
pub mod scheduler;
pub mod types;

pub use checker::{Checker, HttpChecker};
pub use resolver::{Resolver, SystemResolver};
pub use scheduler::{MonitoringScheduler, TickReport};
pub use types::{CheckKind, ProbeOutcome};
