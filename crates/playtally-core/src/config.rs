//! Startup configuration.
//!
//! Everything is optional: an empty file (or no file at all) yields the
//! built-in catalog, the `Asia/Kolkata` reporting zone, a 15 minute poll
//! interval checked every 60 seconds, and fetches with a 15 second timeout
//! and two linearly backed-off retries.
//!
//! ```toml
//! time_zone = "Asia/Kolkata"
//! data_dir = "data"
//!
//! [scheduler]
//! poll_interval_secs = 900
//!
//! [[items]]
//! id = "firestorm"
//! title = "Firestorm"
//! url = "https://www.jiosaavn.com/album/firestorm-from-they-call-him-og/yHG4eDZauLQ_"
//! history = "firestorm_history.json"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::catalog::{Catalog, TrackedItem};
use crate::error::ConfigError;

pub const DEFAULT_TIME_ZONE: &str = "Asia/Kolkata";
pub const DEFAULT_SUMMARY_FILE: &str = "stats_summary.json";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36";

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// IANA zone used for timestamps and hour buckets.
    pub time_zone: String,
    /// Base directory for relative history/summary paths.
    pub data_dir: PathBuf,
    /// Summary artifact regenerated after every poll; `""` disables it.
    pub summary_file: PathBuf,
    pub scheduler: SchedulerSettings,
    pub fetch: FetchSettings,
    pub items: Vec<ItemConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            data_dir: PathBuf::from("."),
            summary_file: PathBuf::from(DEFAULT_SUMMARY_FILE),
            scheduler: SchedulerSettings::default(),
            fetch: FetchSettings::default(),
            items: default_items(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
    pub tick_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 900,
            tick_secs: 60,
        }
    }
}

impl SchedulerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_secs: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_retries: 2,
            backoff_secs: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemConfig {
    pub id: String,
    pub title: String,
    pub url: String,
    /// History file; defaults to `<id>_history.json`.
    pub history: Option<PathBuf>,
}

fn default_items() -> Vec<ItemConfig> {
    vec![
        ItemConfig {
            id: "firestorm".to_string(),
            title: "Firestorm".to_string(),
            url: "https://www.jiosaavn.com/album/firestorm-from-they-call-him-og/yHG4eDZauLQ_"
                .to_string(),
            history: None,
        },
        ItemConfig {
            id: "hungry_cheetah".to_string(),
            title: "Hungry Cheetah".to_string(),
            url: "https://www.jiosaavn.com/song/hungry-cheetah-from-they-call-him-og/OgQvaDxEbwE"
                .to_string(),
            history: None,
        },
    ]
}

impl Config {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// `load(path)` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        if self.items.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        let mut seen = HashSet::new();
        for item in &self.items {
            if item.id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "items.id",
                    message: "must not be empty".to_string(),
                });
            }
            if !seen.insert(item.id.as_str()) {
                return Err(ConfigError::DuplicateItem(item.id.clone()));
            }
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.poll_interval_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.scheduler.tick_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.tick_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fetch.timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Reporting time zone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimeZone(self.time_zone.clone()))
    }

    /// Catalog with history handles relative to [`Config::data_dir`].
    pub fn catalog(&self) -> Catalog {
        Catalog::new(
            self.items
                .iter()
                .map(|item| {
                    let history = item
                        .history
                        .clone()
                        .unwrap_or_else(|| PathBuf::from(format!("{}_history.json", item.id)));
                    TrackedItem::new(&item.id, &item.title, &item.url, history)
                })
                .collect(),
        )
    }

    /// Resolved summary artifact path, if enabled.
    pub fn summary_path(&self) -> Option<PathBuf> {
        if self.summary_file.as_os_str().is_empty() {
            None
        } else {
            Some(self.data_dir.join(&self.summary_file))
        }
    }
}
