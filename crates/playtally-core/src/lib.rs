//! # playtally-core
//!
//! **Hourly play-count history for a handful of tracked songs.**
//!
//! `playtally-core` samples a single monotonically growing number per tracked
//! item, keeps at most one sample per calendar hour, and derives rolling
//! statistics (last hour, last 24 hours, average rate) from the stored
//! history.
//!
//! ## Quick Start
//!
//! ```no_run
//! use playtally_core::{IngestionPolicy, JsonFileStore, SeriesStore, aggregate, now_in};
//! use std::path::Path;
//!
//! let tz = chrono_tz::Asia::Kolkata;
//! let store = JsonFileStore::new("data", tz);
//! let history = Path::new("firestorm_history.json");
//!
//! let series = store.load(history).unwrap();
//! let now = now_in(tz);
//! match IngestionPolicy::new(tz).evaluate(&series, Some(1_234_567), now) {
//!     playtally_core::Decision::Accept(sample) => store.append(history, sample).unwrap(),
//!     playtally_core::Decision::Reject(why) => println!("skipped: {why}"),
//! }
//!
//! let view = aggregate(store.load(history).unwrap().samples(), now);
//! println!("last hour: {:?}", view.hour.map(|w| w.delta));
//! ```
//!
//! ## Architecture
//!
//! Fetcher → IngestionPolicy → SeriesStore → WindowAggregator → views
//!
//! - [`IngestionPolicy`] is the only gate to durable history. It rejects
//!   decreasing readings and anything in an hour that already has a sample.
//! - [`SeriesStore`] loads and appends; [`JsonFileStore`] rewrites each
//!   history file atomically through a temp file.
//! - [`window`] finds the reference sample nearest to `now - 1h` and
//!   `now - 24h` and computes deltas and the average rate.
//! - [`GapFilter`] downsamples a history to roughly hourly spacing for
//!   exports, always keeping the newest sample.
//! - [`Scheduler`] drives the whole thing on a 60 second tick with a 15
//!   minute poll interval.
//!
//! Every failure is scoped to one item: a failed fetch or a corrupt history
//! file skips that item for the current poll and nothing else.

pub mod catalog;
pub mod compaction;
pub mod config;
pub mod display;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod sample;
pub mod scheduler;
pub mod store;
pub mod summary;
pub mod window;

pub use catalog::{Catalog, TrackedItem};
pub use compaction::GapFilter;
pub use config::{Config, FetchSettings, ItemConfig, SchedulerSettings};
pub use display::{group_digits, signed};
pub use error::{AggregateError, ConfigError, FetchError, PollError, SampleError, StoreError};
pub use fetch::{HttpFetcher, MetricFetcher, RetryPolicy, extract_play_count};
pub use ingest::{Decision, IngestionPolicy, Rejection};
pub use sample::{
    HourBucket, Sample, SampleRecord, TIMESTAMP_FORMAT, TimeSeries, format_timestamp, now_in,
    parse_timestamp,
};
pub use scheduler::{ItemOutcome, PollClock, PollReport, PollStatus, Scheduler};
pub use store::{
    JsonFileStore, MemoryStore, SeriesStore, load_or_empty, read_csv_records, read_records,
    records_to_series, write_json_atomic,
};
pub use summary::{ItemSummary, Summary, build_summary, write_summary};
pub use window::{
    AggregateView, Horizon, SampleChange, WindowDelta, aggregate, average_rate,
    consecutive_changes, nearest_reference, window_delta,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
