//! The polling loop.
//!
//! A tick fires every 60 seconds; a poll runs only when the [`PollClock`]
//! says the 15 minute interval has elapsed since the last completed poll.
//! A poll sweeps the catalog in order and every item is handled on its own:
//! a failed fetch or an unreadable history skips that item and nothing else.
//!
//! The scheduler never keeps series in memory between polls. Each item is
//! loaded fresh, evaluated, appended, and dropped, so the read path can load
//! the same files concurrently without coordination.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, TrackedItem};
use crate::config::SchedulerSettings;
use crate::error::PollError;
use crate::fetch::MetricFetcher;
use crate::ingest::{Decision, IngestionPolicy, Rejection};
use crate::sample::{Sample, now_in};
use crate::store::SeriesStore;
use crate::summary::{build_summary, write_summary};

// ---------------------------------------------------------------------------
// Poll clock
// ---------------------------------------------------------------------------

/// Decides when the next poll is due.
#[derive(Debug, Clone, Copy)]
pub struct PollClock {
    interval: Duration,
    last_completed: Option<DateTime<Tz>>,
}

impl PollClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_completed: None,
        }
    }

    /// Due when nothing has completed yet or the interval has fully elapsed.
    /// A clock that went backwards is not due.
    pub fn is_due(&self, now: DateTime<Tz>) -> bool {
        match self.last_completed {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.interval),
        }
    }

    pub fn record_completed(&mut self, at: DateTime<Tz>) {
        self.last_completed = Some(at);
    }

    pub fn last_completed(&self) -> Option<DateTime<Tz>> {
        self.last_completed
    }

    pub fn next_due(&self) -> Option<DateTime<Tz>> {
        let last = self.last_completed?;
        let interval = TimeDelta::from_std(self.interval).ok()?;
        last.checked_add_signed(interval)
    }
}

/// Published after every completed poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStatus {
    pub polls_completed: u64,
    pub last_completed: Option<DateTime<Tz>>,
    pub next_due: Option<DateTime<Tz>>,
}

// ---------------------------------------------------------------------------
// Poll results
// ---------------------------------------------------------------------------

/// What happened to one item during a poll.
#[derive(Debug)]
pub enum ItemOutcome {
    Appended(Sample),
    Skipped(Rejection),
    Failed(PollError),
}

#[derive(Debug)]
pub struct PollReport {
    pub started_at: DateTime<Tz>,
    /// `(item id, outcome)` in catalog order.
    pub outcomes: Vec<(String, ItemOutcome)>,
}

impl PollReport {
    pub fn appended(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Appended(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    pub fn outcome(&self, id: &str) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|(i, _)| i == id).map(|(_, o)| o)
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    catalog: Catalog,
    fetcher: Arc<dyn MetricFetcher>,
    store: Arc<dyn SeriesStore>,
    policy: IngestionPolicy,
    clock: PollClock,
    tick: Duration,
    summary_path: Option<PathBuf>,
    status: watch::Sender<PollStatus>,
}

impl Scheduler {
    pub fn new(
        catalog: Catalog,
        fetcher: Arc<dyn MetricFetcher>,
        store: Arc<dyn SeriesStore>,
        policy: IngestionPolicy,
        settings: &SchedulerSettings,
    ) -> Self {
        let (status, _) = watch::channel(PollStatus::default());
        Self {
            catalog,
            fetcher,
            store,
            policy,
            clock: PollClock::new(settings.poll_interval()),
            tick: settings.tick(),
            summary_path: None,
            status,
        }
    }

    /// Regenerate the summary artifact at `path` after every poll.
    pub fn with_summary(mut self, path: Option<PathBuf>) -> Self {
        self.summary_path = path;
        self
    }

    /// Receiver for the status published after each completed poll.
    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status.subscribe()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Sweep every item once, regardless of the poll clock.
    pub async fn poll_once(&self, now: DateTime<Tz>) -> PollReport {
        log::info!(
            "polling {} items at {}",
            self.catalog.len(),
            now.format("%Y-%m-%d %H:%M:%S %Z")
        );
        let mut outcomes = Vec::with_capacity(self.catalog.len());
        for item in self.catalog.items() {
            let outcome = self.poll_item(item, now).await;
            outcomes.push((item.id.clone(), outcome));
        }
        let report = PollReport {
            started_at: now,
            outcomes,
        };
        log::info!(
            "poll finished: {} appended, {} skipped, {} failed",
            report.appended(),
            report.skipped(),
            report.failed()
        );

        if let Some(path) = &self.summary_path {
            let summary = build_summary(&self.catalog, self.store.as_ref(), now);
            if let Err(e) = write_summary(&summary, path) {
                log::error!("{e}");
            }
        }
        report
    }

    async fn poll_item(&self, item: &TrackedItem, now: DateTime<Tz>) -> ItemOutcome {
        let observed = match self.fetcher.fetch(&item.locator).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{}: {}: {e}", item.id, Rejection::FetchFailed);
                return ItemOutcome::Failed(e.into());
            }
        };

        // Write path: never append on top of history that could not be read.
        let series = match self.store.load(item.history()) {
            Ok(series) => series,
            Err(e) => {
                log::warn!("{}: skipping, history unreadable: {e}", item.id);
                return ItemOutcome::Failed(e.into());
            }
        };

        match self.policy.evaluate(&series, Some(observed), now) {
            Decision::Accept(sample) => match self.store.append(item.history(), sample) {
                Ok(()) => {
                    log::info!("{}: appended {}", item.id, sample.value);
                    ItemOutcome::Appended(sample)
                }
                Err(e) => {
                    log::error!("{}: {e}", item.id);
                    ItemOutcome::Failed(e.into())
                }
            },
            Decision::Reject(rejection) => {
                match rejection {
                    Rejection::SameBucketSkipped { .. } => {
                        log::debug!("{}: {rejection}", item.id);
                    }
                    Rejection::DecreasingValue { .. } => {
                        log::warn!(
                            "{}: {rejection}; reading discarded, needs manual intervention if the source was reset",
                            item.id
                        );
                    }
                    Rejection::FetchFailed | Rejection::ClockSkew { .. } => {
                        log::warn!("{}: {rejection}", item.id);
                    }
                }
                ItemOutcome::Skipped(rejection)
            }
        }
    }

    /// Tick until `cancel` fires, polling whenever the clock is due.
    pub async fn run(mut self, cancel: CancellationToken) {
        let tz = self.policy.time_zone();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "scheduler started: {} items, tick {:?}, interval {:?}",
            self.catalog.len(),
            self.tick,
            self.clock.interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = now_in(tz);
            if !self.clock.is_due(now) {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.poll_once(now) => {}
            }

            self.clock.record_completed(now_in(tz));
            self.status.send_modify(|status| {
                status.polls_completed += 1;
                status.last_completed = self.clock.last_completed();
                status.next_due = self.clock.next_due();
            });
        }
        log::info!("scheduler stopped");
    }
}
