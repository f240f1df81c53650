//! Expiration scheduler trigger loop
//!
//! Fires the expiration cycle on a recurring `Schedule`. Failures are logged
//! and left for the next natural cycle; the loop itself never retries.

use crate::config::SchedulerConfig;
use crate::error::ExpiryError;
use crate::proposal::ProposalStore;
use crate::scheduler::cycle::{run_expiration_cycle, CycleOptions, CycleReport};
use crate::scheduler::Schedule;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Source of the evaluation timestamp
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to the microsecond precision Postgres stores
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// Expiration scheduler - runs the expiration cycle on a recurring schedule
pub struct ExpirationScheduler {
    store: Arc<dyn ProposalStore>,
    schedule: Schedule,
    options: CycleOptions,
    run_on_startup: bool,
    max_staleness: Duration,
    clock: Arc<dyn Clock>,
}

impl ExpirationScheduler {
    pub fn new(store: Arc<dyn ProposalStore>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            schedule: config.schedule,
            options: CycleOptions {
                batch_limit: config.batch_size,
                concurrent_batches: config.concurrent_batches,
            },
            run_on_startup: config.run_on_startup,
            max_staleness: config.max_staleness,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one cycle now. The clock is read exactly once.
    pub async fn run_cycle(&self) -> Result<CycleReport, ExpiryError> {
        let now = self.clock.now();
        let result = run_expiration_cycle(self.store.as_ref(), now, self.options).await;

        let report = match &result {
            Ok(report) => Some(report),
            Err(e) => e.report(),
        };
        if let Some(report) = report {
            self.check_staleness(report);
        }

        result
    }

    /// Alert when overdue proposals waited longer than one cadence should allow
    fn check_staleness(&self, report: &CycleReport) -> bool {
        match report.staleness() {
            Some(staleness) if staleness > self.max_staleness => {
                warn!(
                    collection = self.store.collection(),
                    oldest_expires_at = ?report.oldest_expires_at,
                    staleness_hours = staleness.num_hours(),
                    max_staleness_hours = self.max_staleness.num_hours(),
                    "Overdue proposals stayed active longer than the staleness bound"
                );
                true
            }
            _ => false,
        }
    }

    async fn trigger(&self) {
        if let Err(e) = self.run_cycle().await {
            error!(
                collection = self.store.collection(),
                error = %e,
                "Expiration cycle failed; remaining proposals will be retried on the next run"
            );
        }
    }

    /// Start the scheduler (runs in background) until `shutdown` flips to true
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                collection = self.store.collection(),
                schedule = %self.schedule,
                batch_limit = self.options.batch_limit,
                "Expiration scheduler started"
            );

            if self.run_on_startup {
                info!("Running catch-up expiration cycle on startup");
                self.trigger().await;
            }

            loop {
                let now = self.clock.now();
                let Some(next) = self.schedule.next_after(now) else {
                    error!(
                        schedule = %self.schedule,
                        now = %now,
                        "No representable next fire time; stopping expiration scheduler"
                    );
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                info!(next_run = %next, "Next expiration cycle scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                self.trigger().await;
            }

            info!("Expiration scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{InMemoryProposalStore, Proposal, ProposalStatus};
    use std::sync::Mutex;

    /// Clock pinned to a settable instant
    struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        fn at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(now)))
        }

        fn set(&self, now: DateTime<Utc>) {
            *self.0.lock().unwrap() = now;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn monday() -> DateTime<Utc> {
        "2024-06-10T00:00:00Z".parse().unwrap()
    }

    fn scheduler(store: Arc<InMemoryProposalStore>, clock: Arc<FixedClock>) -> ExpirationScheduler {
        ExpirationScheduler::new(store, &SchedulerConfig::default()).with_clock(clock)
    }

    #[tokio::test]
    async fn test_run_cycle_uses_injected_clock() {
        let now = monday();
        let store = Arc::new(InMemoryProposalStore::default());
        let overdue = Proposal::new(now - Duration::days(2));
        let pending = Proposal::new(now + Duration::days(2));
        store.extend([overdue.clone(), pending.clone()]).await;

        let clock = FixedClock::at(now);
        let scheduler = scheduler(store.clone(), clock.clone());

        let report = tokio_test::assert_ok!(scheduler.run_cycle().await);
        assert_eq!(report.evaluated_at, now);
        assert_eq!(report.updated, 1);
        assert_eq!(store.get(overdue.id).await.unwrap().updated_at, now);

        // A week later the second proposal is due
        clock.set(now + Duration::weeks(1));
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(store.get(pending.id).await.unwrap().status, ProposalStatus::Expired);
        assert_eq!(store.count().await, 2);
    }

    #[test]
    fn test_staleness_alert_threshold() {
        let now = monday();
        let store = Arc::new(InMemoryProposalStore::default());
        let scheduler = scheduler(store, FixedClock::at(now));

        let fresh = CycleReport {
            evaluated_at: now,
            found: 1,
            updated: 1,
            batches_committed: 1,
            batches_failed: 0,
            oldest_expires_at: Some(now - Duration::days(3)),
        };
        let stale = CycleReport {
            oldest_expires_at: Some(now - Duration::days(9)),
            ..fresh.clone()
        };

        assert!(!scheduler.check_staleness(&fresh));
        assert!(scheduler.check_staleness(&stale));
        assert!(!scheduler.check_staleness(&CycleReport {
            found: 0,
            updated: 0,
            batches_committed: 0,
            oldest_expires_at: None,
            ..fresh
        }));
    }

    #[test]
    fn test_system_clock_has_microsecond_precision() {
        let now = SystemClock.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[tokio::test]
    async fn test_start_stops_when_no_next_fire_exists() {
        let store = Arc::new(InMemoryProposalStore::default());
        let config = SchedulerConfig {
            schedule: Schedule::parse("every:1day", "+00:00").unwrap(),
            ..SchedulerConfig::default()
        };
        let scheduler = Arc::new(
            ExpirationScheduler::new(store.clone(), &config)
                .with_clock(FixedClock::at(DateTime::<Utc>::MAX_UTC)),
        );
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = scheduler.start(shutdown_rx);
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("scheduler task should exit on its own")
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_runs_catch_up_cycle_and_stops_on_shutdown() {
        let now = monday();
        let store = Arc::new(InMemoryProposalStore::default());
        let overdue = Proposal::new(now - Duration::hours(1));
        store.insert(overdue.clone()).await;

        let scheduler = Arc::new(scheduler(store.clone(), FixedClock::at(now)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = scheduler.start(shutdown_rx);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(store.get(overdue.id).await.unwrap().status, ProposalStatus::Expired);
        assert_eq!(store.commit_count(), 1);
    }
}
