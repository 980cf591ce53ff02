//! The `stats_summary.json` artifact.
//!
//! A pure function of the persisted series and the generation time: building
//! it twice from the same files at the same `now` gives identical output.
//! Items without history are left out.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::StoreError;
use crate::sample::format_timestamp;
use crate::store::{SeriesStore, load_or_empty, write_json_atomic};
use crate::window::aggregate;

pub const GRANULARITY: &str = "hourly";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub generated_at: String,
    pub granularity: &'static str,
    pub items: BTreeMap<String, ItemSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub title: String,
    pub current: u64,
    pub previous_hour: Option<u64>,
    pub hour_increase: Option<i64>,
    pub previous_24h: Option<u64>,
    pub day_increase: Option<i64>,
    pub entries: usize,
}

/// Summarize every catalog item with at least one sample.
pub fn build_summary(catalog: &Catalog, store: &dyn SeriesStore, now: DateTime<Tz>) -> Summary {
    let mut items = BTreeMap::new();
    for item in catalog.items() {
        let (series, _) = load_or_empty(store, item.history());
        let view = aggregate(series.samples(), now);
        let Some(latest) = view.latest else {
            continue;
        };
        items.insert(
            item.id.clone(),
            ItemSummary {
                title: item.title.clone(),
                current: latest.value,
                previous_hour: view.hour.map(|w| w.reference.value),
                hour_increase: view.hour.map(|w| w.delta),
                previous_24h: view.day.map(|w| w.reference.value),
                day_increase: view.day.map(|w| w.delta),
                entries: view.sample_count,
            },
        );
    }
    Summary {
        generated_at: format_timestamp(&now),
        granularity: GRANULARITY,
        items,
    }
}

/// Atomically write `summary` to `path`.
pub fn write_summary(summary: &Summary, path: &Path) -> Result<(), StoreError> {
    write_json_atomic(path, summary).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!(
        "summary written to {} ({} items)",
        path.display(),
        summary.items.len()
    );
    Ok(())
}
