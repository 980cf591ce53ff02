//! Integration tests for playtally-core.
//!
//! These run the whole write path and read path together:
//! scheduler → fetcher → ingestion policy → JSON store → aggregation/summary.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use chrono_tz::Asia::Kolkata;
use chrono_tz::Tz;

use playtally_core::{
    Catalog, FetchError, GapFilter, IngestionPolicy, ItemOutcome, JsonFileStore, MetricFetcher,
    Rejection, SchedulerSettings, Scheduler, SeriesStore, TrackedItem, aggregate, build_summary,
    read_records,
};

/// Hands out a queued value per locator; an empty queue is a fetch failure.
#[derive(Default)]
struct ScriptedFetcher {
    queues: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl ScriptedFetcher {
    fn push(&self, locator: &str, value: u64) {
        self.queues
            .lock()
            .unwrap()
            .entry(locator.to_string())
            .or_default()
            .push_back(value);
    }
}

#[async_trait]
impl MetricFetcher for ScriptedFetcher {
    async fn fetch(&self, locator: &str) -> Result<u64, FetchError> {
        self.queues
            .lock()
            .unwrap()
            .get_mut(locator)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| FetchError::PlayCountNotFound {
                url: locator.to_string(),
            })
    }
}

fn at(h: u32, m: u32) -> DateTime<Tz> {
    Kolkata.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
}

fn setup(
    dir: &Path,
) -> (Scheduler, Arc<ScriptedFetcher>, Arc<JsonFileStore>) {
    let catalog = Catalog::new(vec![
        TrackedItem::new("firestorm", "Firestorm", "loc-firestorm", "firestorm_history.json"),
        TrackedItem::new("cheetah", "Hungry Cheetah", "loc-cheetah", "cheetah_history.json"),
    ]);
    let fetcher = Arc::new(ScriptedFetcher::default());
    let store = Arc::new(JsonFileStore::new(dir, Kolkata));
    let scheduler = Scheduler::new(
        catalog,
        fetcher.clone(),
        store.clone(),
        IngestionPolicy::new(Kolkata),
        &SchedulerSettings::default(),
    )
    .with_summary(Some(dir.join("stats_summary.json")));
    (scheduler, fetcher, store)
}

#[tokio::test]
async fn end_to_end_hourly_ingestion_and_aggregation() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, fetcher, store) = setup(tmp.path());

    fetcher.push("loc-firestorm", 500);
    let report = scheduler.poll_once(at(10, 0)).await;
    assert!(matches!(report.outcome("firestorm"), Some(ItemOutcome::Appended(_))));

    fetcher.push("loc-firestorm", 500);
    let report = scheduler.poll_once(at(10, 5)).await;
    assert!(matches!(
        report.outcome("firestorm"),
        Some(ItemOutcome::Skipped(Rejection::SameBucketSkipped { .. }))
    ));

    fetcher.push("loc-firestorm", 620);
    let report = scheduler.poll_once(at(11, 10)).await;
    assert!(matches!(report.outcome("firestorm"), Some(ItemOutcome::Appended(_))));

    let series = store.load(Path::new("firestorm_history.json")).unwrap();
    let values: Vec<u64> = series.samples().iter().map(|s| s.value).collect();
    assert_eq!(values, vec![500, 620]);

    let view = aggregate(series.samples(), at(11, 10));
    assert_eq!(view.hour.unwrap().delta, 120);
    assert_eq!(view.hour.unwrap().reference.value, 500);
    let rate = view.average_rate.unwrap();
    assert!((rate - 120.0 / 70.0).abs() < 1e-9, "rate was {rate}");

    // Persisted in the canonical record format.
    let records = read_records(&tmp.path().join("firestorm_history.json"))
        .unwrap()
        .unwrap();
    assert_eq!(records[0].timestamp, "2024-01-01 10:00:00 IST");
    assert_eq!(records[1].value, "620");

    // Summary regenerated after the last poll.
    let summary: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(tmp.path().join("stats_summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["granularity"], "hourly");
    assert_eq!(summary["items"]["firestorm"]["current"], 620);
    assert_eq!(summary["items"]["firestorm"]["hour_increase"], 120);
    assert_eq!(summary["items"]["firestorm"]["entries"], 2);
    assert!(summary["items"].get("cheetah").is_none());
}

#[tokio::test]
async fn one_failing_item_does_not_block_the_other() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("cheetah_history.json"), "{ not json").unwrap();
    let (scheduler, fetcher, store) = setup(tmp.path());

    fetcher.push("loc-firestorm", 10);
    fetcher.push("loc-cheetah", 20);
    let report = scheduler.poll_once(at(10, 0)).await;

    assert_eq!(report.appended(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(
        store.load(Path::new("firestorm_history.json")).unwrap().len(),
        1
    );
    // Unreadable history is never overwritten.
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("cheetah_history.json")).unwrap(),
        "{ not json"
    );
}

#[tokio::test]
async fn source_reset_is_rejected_every_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, fetcher, store) = setup(tmp.path());

    fetcher.push("loc-firestorm", 100);
    scheduler.poll_once(at(10, 0)).await;
    for (hour, value) in [(11, 90), (12, 95)] {
        fetcher.push("loc-firestorm", value);
        let report = scheduler.poll_once(at(hour, 0)).await;
        assert!(matches!(
            report.outcome("firestorm"),
            Some(ItemOutcome::Skipped(Rejection::DecreasingValue { last: 100, .. }))
        ));
    }
    assert_eq!(
        store.load(Path::new("firestorm_history.json")).unwrap().len(),
        1
    );
}

#[tokio::test]
async fn compaction_of_dense_history_keeps_endpoints() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, fetcher, store) = setup(tmp.path());

    let mut value = 1000;
    for hour in 0..6 {
        value += 37;
        fetcher.push("loc-firestorm", value);
        scheduler.poll_once(at(hour, 50)).await;
    }
    let series = store.load(Path::new("firestorm_history.json")).unwrap();
    assert_eq!(series.len(), 6);

    let compacted = GapFilter::default().apply(series.samples());
    assert_eq!(compacted.first(), series.first());
    assert_eq!(compacted.last(), series.last());

    let summary = build_summary(scheduler.catalog(), store.as_ref(), at(5, 50));
    assert_eq!(summary.items["firestorm"].hour_increase, Some(37));
}
