use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use super::checker::Checker;
use super::resolver::Resolver;
use crate::database::{CheckRecord, CheckStore};
use crate::error::StoreResult;

/// Outcome counts for one tick's fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Targets dispatched
    pub attempted: usize,
    /// Records written
    pub stored: usize,
    /// Records lost to a store error or an aborted task
    pub failed: usize,
}

/// Everything one target's task needs: resolve, probe, record.
#[derive(Clone)]
struct Pipeline {
    checker: Arc<dyn Checker>,
    resolver: Arc<dyn Resolver>,
    store: Arc<dyn CheckStore>,
}

impl Pipeline {
    async fn check_target(self, target: String) -> StoreResult<()> {
        // Resolution never gates the probe
        let (address, outcome) =
            tokio::join!(self.resolver.resolve(&target), self.checker.check(&target));
        let outcome = outcome.with_address(address);

        info!(
            url = %target,
            status = outcome.status_code.unwrap_or(0),
            latency_ms = outcome.latency_ms(),
            error = %outcome.error,
            "ping result"
        );

        let record = CheckRecord::from_outcome(
            Utc::now(),
            outcome,
            self.checker.kind(),
            self.checker.agent(),
        );
        self.store.insert_check(&record).await
    }
}

/// Monitoring scheduler - probes every target once per tick
pub struct MonitoringScheduler {
    pipeline: Pipeline,
    targets: Arc<[String]>,
    period: Duration,
    span: Span,
}

impl MonitoringScheduler {
    pub fn new(
        checker: Arc<dyn Checker>,
        resolver: Arc<dyn Resolver>,
        store: Arc<dyn CheckStore>,
        targets: Vec<String>,
        period: Duration,
    ) -> Self {
        Self {
            pipeline: Pipeline { checker, resolver, store },
            targets: targets.into(),
            period,
            span: info_span!("ping_worker"),
        }
    }

    /// Log every event of this scheduler under `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Run ticks until `shutdown` flips to `true` (or its sender goes away).
    ///
    /// The first tick fires one period after start. A tick whose fan-out
    /// overruns the period does not delay the next one. On shutdown no new
    /// tick starts, but every tick already in flight is awaited before this
    /// returns. Returns the number of ticks run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Burst);

        let mut in_flight: JoinSet<TickReport> = JoinSet::new();
        let mut ticks = 0u64;

        info!(
            parent: &self.span,
            targets = self.targets.len(),
            period_s = self.period.as_secs_f64(),
            "ping worker started"
        );

        if !*shutdown.borrow_and_update() {
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        ticks += 1;
                        let span = info_span!(parent: &self.span, "tick", tick = ticks);
                        in_flight.spawn(
                            fan_out(self.pipeline.clone(), Arc::clone(&self.targets)).instrument(span),
                        );
                    }
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        self.log_tick(joined);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow_and_update() {
                            break;
                        }
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(parent: &self.span, in_flight = in_flight.len(), "waiting for in-flight ticks");
        }
        while let Some(joined) = in_flight.join_next().await {
            self.log_tick(joined);
        }

        info!(parent: &self.span, ticks, "ping worker stopped");
        ticks
    }

    /// One fan-out over every target, returning once each record was attempted
    pub async fn run_tick(&self) -> TickReport {
        fan_out(self.pipeline.clone(), Arc::clone(&self.targets)).instrument(self.span.clone()).await
    }

    fn log_tick(&self, joined: Result<TickReport, tokio::task::JoinError>) {
        match joined {
            Ok(report) if report.failed > 0 => warn!(
                parent: &self.span,
                attempted = report.attempted,
                stored = report.stored,
                failed = report.failed,
                "tick completed with lost records"
            ),
            Ok(report) => debug!(
                parent: &self.span,
                attempted = report.attempted,
                stored = report.stored,
                "tick completed"
            ),
            Err(e) => error!(parent: &self.span, error = %e, "tick task failed"),
        }
    }
}

/// Spawn one task per target and wait for all of them.
///
/// Each task owns its outcome until it reaches the store; a failing or
/// panicking target only costs its own record.
async fn fan_out(pipeline: Pipeline, targets: Arc<[String]>) -> TickReport {
    let tasks: Vec<_> = targets
        .iter()
        .map(|target| {
            let task = pipeline.clone().check_target(target.clone());
            tokio::spawn(task.in_current_span())
        })
        .collect();

    let mut report = TickReport { attempted: tasks.len(), ..TickReport::default() };

    for (target, joined) in targets.iter().zip(join_all(tasks).await) {
        match joined {
            Ok(Ok(())) => report.stored += 1,
            Ok(Err(e)) => {
                error!(url = %target, error = %e, "failed to insert check");
                report.failed += 1;
            }
            Err(e) => {
                error!(url = %target, error = %e, "check task aborted");
                report.failed += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{PingStat, repository::tests::create_test_store};
    use crate::error::StoreError;
    use crate::monitoring::checker::HttpChecker;
    use crate::monitoring::checker::tests::{mock_endpoint, refused_endpoint};
    use crate::monitoring::types::{CheckKind, ProbeOutcome};
    use std::collections::{HashMap, HashSet};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        records: Mutex<Vec<CheckRecord>>,
        reject: HashSet<String>,
    }

    impl RecordingStore {
        fn rejecting(targets: &[&str]) -> Self {
            Self { reject: targets.iter().map(|t| t.to_string()).collect(), ..Self::default() }
        }

        fn records(&self) -> Vec<CheckRecord> {
            self.records.lock().unwrap().clone()
        }

        fn record_for(&self, addr: &str) -> Vec<CheckRecord> {
            self.records().into_iter().filter(|r| r.addr == addr).collect()
        }
    }

    #[async_trait::async_trait]
    impl CheckStore for RecordingStore {
        async fn ping(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn insert_check(&self, record: &CheckRecord) -> StoreResult<()> {
            if self.reject.contains(&record.addr) {
                return Err(StoreError::Decode("write rejected".into()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn ping_stats(&self) -> StoreResult<Vec<PingStat>> {
            Ok(Vec::new())
        }
    }

    /// Answers every target after `delay`; targets in `down` fail, `panics` panic.
    #[derive(Default)]
    struct ScriptedChecker {
        delay: Duration,
        down: HashSet<String>,
        panics: HashSet<String>,
    }

    #[async_trait::async_trait]
    impl Checker for ScriptedChecker {
        fn kind(&self) -> CheckKind {
            CheckKind::Http
        }

        fn agent(&self) -> &str {
            "scripted"
        }

        async fn check(&self, target: &str) -> ProbeOutcome {
            tokio::time::sleep(self.delay).await;
            if self.panics.contains(target) {
                panic!("checker exploded on {target}");
            }
            if self.down.contains(target) {
                return ProbeOutcome::failed(target, "connection refused", self.delay);
            }
            ProbeOutcome::completed(target, 200, self.delay)
        }
    }

    struct ScriptedResolver {
        addresses: HashMap<String, IpAddr>,
    }

    #[async_trait::async_trait]
    impl Resolver for ScriptedResolver {
        async fn resolve(&self, target: &str) -> Option<IpAddr> {
            self.addresses.get(target).copied()
        }
    }

    fn targets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://target-{i}.test/")).collect()
    }

    fn resolver_for(targets: &[String]) -> Arc<ScriptedResolver> {
        let addresses = targets
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), IpAddr::V4(Ipv4Addr::new(192, 0, 2, i as u8 + 1))))
            .collect();
        Arc::new(ScriptedResolver { addresses })
    }

    fn scheduler(
        checker: ScriptedChecker,
        resolver: Arc<ScriptedResolver>,
        store: Arc<RecordingStore>,
        targets: Vec<String>,
        period: Duration,
    ) -> MonitoringScheduler {
        MonitoringScheduler::new(Arc::new(checker), resolver, store, targets, period)
    }

    #[tokio::test]
    async fn test_one_record_per_target() {
        let targets = targets(4);
        let store = Arc::new(RecordingStore::default());
        let scheduler = scheduler(
            ScriptedChecker::default(),
            resolver_for(&targets),
            store.clone(),
            targets.clone(),
            Duration::from_secs(60),
        );
        assert_eq!(scheduler.targets(), targets.as_slice());

        let report = scheduler.run_tick().await;

        assert_eq!(report, TickReport { attempted: 4, stored: 4, failed: 0 });
        for (i, target) in targets.iter().enumerate() {
            let records = store.record_for(target);
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].ip4, Some(Ipv4Addr::new(192, 0, 2, i as u8 + 1)));
            assert_eq!(records[0].agent, "scripted");
            assert_eq!(records[0].kind, CheckKind::Http);
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_isolated() {
        let targets = targets(3);
        let store = Arc::new(RecordingStore::rejecting(&[targets[1].as_str()]));
        let scheduler = scheduler(
            ScriptedChecker::default(),
            resolver_for(&targets),
            store.clone(),
            targets.clone(),
            Duration::from_secs(60),
        );

        let report = scheduler.run_tick().await;

        assert_eq!(report, TickReport { attempted: 3, stored: 2, failed: 1 });
        assert_eq!(store.record_for(&targets[0]).len(), 1);
        assert!(store.record_for(&targets[1]).is_empty());
        assert_eq!(store.record_for(&targets[2]).len(), 1);

        // Next tick is unaffected
        let report = scheduler.run_tick().await;
        assert_eq!(report.stored, 2);
    }

    #[tokio::test]
    async fn test_probe_failure_and_panic_are_isolated() {
        let targets = targets(3);
        let checker = ScriptedChecker {
            down: HashSet::from([targets[0].clone()]),
            panics: HashSet::from([targets[1].clone()]),
            ..ScriptedChecker::default()
        };
        let store = Arc::new(RecordingStore::default());
        let scheduler = scheduler(
            checker,
            resolver_for(&targets),
            store.clone(),
            targets.clone(),
            Duration::from_secs(60),
        );

        let report = scheduler.run_tick().await;

        assert_eq!(report, TickReport { attempted: 3, stored: 2, failed: 1 });

        let down = store.record_for(&targets[0]);
        assert_eq!(down.len(), 1);
        assert!(!down[0].success);
        assert_eq!(down[0].http_code, 0);
        assert_eq!(down[0].err, "connection refused");

        let up = store.record_for(&targets[2]);
        assert_eq!(up.len(), 1);
        assert!(up[0].success);
        assert_eq!(up[0].http_code, 200);
    }

    #[tokio::test]
    async fn test_resolution_failure_still_records() {
        let targets = targets(2);
        let resolver = Arc::new(ScriptedResolver { addresses: HashMap::new() });
        let store = Arc::new(RecordingStore::default());
        let scheduler = scheduler(
            ScriptedChecker::default(),
            resolver,
            store.clone(),
            targets.clone(),
            Duration::from_secs(60),
        );

        scheduler.run_tick().await;

        let records = store.records();
        assert_eq!(records.len(), 2);
        for record in records {
            assert_eq!(record.ip4, None);
            assert!(record.success);
            assert_eq!(record.http_code, 200);
            assert!(record.err.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_targets_are_probed_in_parallel() {
        let targets = targets(5);
        let checker = ScriptedChecker { delay: Duration::from_millis(300), ..ScriptedChecker::default() };
        let store = Arc::new(RecordingStore::default());
        let scheduler =
            scheduler(checker, resolver_for(&targets), store.clone(), targets, Duration::from_secs(60));

        let started = Instant::now();
        let report = scheduler.run_tick().await;
        let elapsed = started.elapsed();

        assert_eq!(report.stored, 5);
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(600), "tick took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_overlapping_ticks() {
        let targets = targets(3);
        let checker = ScriptedChecker { delay: Duration::from_millis(120), ..ScriptedChecker::default() };
        let store = Arc::new(RecordingStore::default());
        let scheduler = Arc::new(scheduler(
            checker,
            resolver_for(&targets),
            store.clone(),
            targets,
            Duration::from_millis(50),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };

        // Ticks fire at 50ms and 100ms; the second starts while the first is still probing
        tokio::time::sleep(Duration::from_millis(130)).await;
        assert!(store.records().is_empty());
        shutdown_tx.send(true).unwrap();

        let ticks = worker.await.unwrap();

        assert_eq!(ticks, 2);
        assert_eq!(store.records().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_tick() {
        let targets = targets(2);
        let store = Arc::new(RecordingStore::default());
        let scheduler = scheduler(
            ScriptedChecker::default(),
            resolver_for(&targets),
            store.clone(),
            targets,
            Duration::from_secs(10),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        assert_eq!(scheduler.run(shutdown_rx).await, 0);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_http_targets_end_to_end() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);

        let ok = mock_endpoint(200).await;
        let missing = mock_endpoint(404).await;
        let broken = mock_endpoint(500).await;
        let refused = refused_endpoint().await;

        let scheduler = MonitoringScheduler::new(
            Arc::new(HttpChecker::new(Duration::from_secs(5)).unwrap()),
            Arc::new(crate::monitoring::resolver::SystemResolver),
            store.clone(),
            vec![ok.clone(), missing.clone(), broken.clone(), refused.clone()],
            Duration::from_secs(60),
        );

        let report = scheduler.run_tick().await;
        assert_eq!(report, TickReport { attempted: 4, stored: 4, failed: 0 });

        for (target, code) in [(&ok, 200), (&missing, 404), (&broken, 500)] {
            let records = store.recent_checks(target, 10).await.unwrap();
            assert_eq!(records.len(), 1);
            assert!(records[0].success);
            assert_eq!(records[0].http_code, code);
            assert_eq!(records[0].ip4, Some(Ipv4Addr::LOCALHOST));
            assert_eq!(records[0].agent, HttpChecker::AGENT);
        }

        let records = store.recent_checks(&refused, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].http_code, 0);
        assert!(!records[0].err.is_empty());
        assert!(records[0].latency_ms >= 0.0);
    }
}
