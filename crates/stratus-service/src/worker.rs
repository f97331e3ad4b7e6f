//! Periodic background sync.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::sync::{SyncError, SyncRequest, SyncService};

/// Runs [`SyncService::sync_weather`] on a fixed period.
pub struct Worker {
    sync: SyncService,
    request: SyncRequest,
    period: Duration,
    stats: Arc<WorkerStats>,
}

impl Worker {
    pub fn new(sync: SyncService, request: SyncRequest, period: Duration) -> Self {
        Self {
            sync,
            request,
            period,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Worker with the request and period of a `[worker]` config section.
    pub fn from_config(sync: SyncService, config: &WorkerConfig) -> Self {
        let request = SyncRequest {
            location_id: config.location_id,
            limit: config.limit,
            forecast_days: config.forecast_days,
        };
        Self::new(sync, request, config.period())
    }

    /// Share an existing stats handle, e.g. the one held by the API state.
    pub fn with_stats(mut self, stats: Arc<WorkerStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Sync immediately, then once per period until `cancel` fires.
    ///
    /// A run that outlasts the period delays the next tick; runs never
    /// overlap.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting sync worker (period: {}s, request: {:?})",
            self.period.as_secs(),
            self.request
        );
        self.stats.running.store(true, Ordering::SeqCst);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.sync.sync_weather(&self.request, &cancel).await {
                Ok(report) => {
                    consecutive_failures = 0;
                    self.stats.record_success(report.records as u64);
                    info!(
                        "Sync run finished: {}/{} locations, {} records",
                        report.synced, report.locations, report.records
                    );
                }
                Err(SyncError::Cancelled { .. }) => break,
                Err(e) => {
                    consecutive_failures += 1;
                    if let SyncError::Partial { report, .. } = &e {
                        self.stats.records.fetch_add(report.records as u64, Ordering::Relaxed);
                    }
                    self.stats.record_failure(e.to_string()).await;
                    if consecutive_failures <= 3 {
                        warn!("Sync run failed: {} (attempt {})", e, consecutive_failures);
                    } else if consecutive_failures == 4 {
                        error!(
                            "Sync failed {} runs in a row, will keep trying",
                            consecutive_failures
                        );
                    }
                }
            }
        }

        self.stats.running.store(false, Ordering::SeqCst);
        info!("Sync worker stopped");
    }
}

/// Counters for the periodic worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    running: AtomicBool,
    runs: AtomicU64,
    failures: AtomicU64,
    records: AtomicU64,
    /// Unix seconds of the last finished run; 0 = never.
    last_run_at: AtomicI64,
    last_error: RwLock<Option<WorkerErrorInfo>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerErrorInfo {
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    pub running: bool,
    pub runs: u64,
    pub failures: u64,
    pub records: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run_at: Option<OffsetDateTime>,
    pub last_error: Option<WorkerErrorInfo>,
}

impl WorkerStats {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn mark_run(&self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.last_run_at.store(now.unix_timestamp(), Ordering::Relaxed);
        now
    }

    fn record_success(&self, records: u64) {
        self.mark_run();
        self.records.fetch_add(records, Ordering::Relaxed);
    }

    async fn record_failure(&self, message: String) {
        let at = self.mark_run();
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write().await = Some(WorkerErrorInfo { message, at });
    }

    pub async fn snapshot(&self) -> WorkerStatsSnapshot {
        let last_run = self.last_run_at.load(Ordering::Relaxed);
        WorkerStatsSnapshot {
            running: self.is_running(),
            runs: self.runs(),
            failures: self.failures(),
            records: self.records.load(Ordering::Relaxed),
            last_run_at: if last_run == 0 {
                None
            } else {
                OffsetDateTime::from_unix_timestamp(last_run).ok()
            },
            last_error: self.last_error.read().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::MockSource;
    use stratus_core::mock::sample_payload;
    use stratus_store::Store;
    use stratus_types::NewLocation;
    use time::macros::date;
    use tokio::sync::Mutex;

    async fn worker_with(names: &[&str], failing: &[&str]) -> (Worker, Arc<MockSource>) {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let source = Arc::new(MockSource::new());
        for name in names {
            store
                .lock()
                .await
                .insert_location(&NewLocation {
                    name: name.to_string(),
                    region: "R".into(),
                    country: "C".into(),
                    ..Default::default()
                })
                .unwrap();
            source
                .set_payload(name, sample_payload(name, date!(2026-10-18), 1))
                .await;
        }
        for name in failing {
            source.fail_always(name).await;
        }
        let sync = SyncService::new(store.clone(), store, source.clone());
        let worker = Worker::new(sync, SyncRequest::default(), Duration::from_secs(60));
        (worker, source)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_period() {
        let (worker, source) = worker_with(&["Jakarta"], &[]).await;
        let worker = Arc::new(worker);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let worker = Arc::clone(&worker);
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        handle.await.unwrap();

        let stats = worker.stats().snapshot().await;
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.records, 3 * 25);
        assert!(!stats.running);
        assert!(stats.last_run_at.is_some());
        assert_eq!(source.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_recorded_and_worker_keeps_going() {
        let (worker, _source) = worker_with(&["Jakarta", "Medan"], &["Medan"]).await;
        let worker = Arc::new(worker);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let worker = Arc::clone(&worker);
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(90)).await;
        cancel.cancel();
        handle.await.unwrap();

        let stats = worker.stats().snapshot().await;
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.records, 2 * 25);
        let last_error = stats.last_error.unwrap();
        assert!(last_error.message.contains("Medan"));
    }

    #[tokio::test]
    async fn test_cancelled_worker_does_not_sync() {
        let (worker, source) = worker_with(&["Jakarta"], &[]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        worker.run(cancel).await;

        assert_eq!(worker.stats().runs(), 0);
        assert_eq!(source.request_count(), 0);
    }
}
