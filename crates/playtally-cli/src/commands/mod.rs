pub mod compact;
pub mod poll;
pub mod serve;
pub mod show;
pub mod summary;

use std::path::Path;
use std::time::Duration;

use playtally_core::{Config, JsonFileStore};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Load the config file, or the built-in defaults when no path is given.
pub fn load_config(path: Option<&str>) -> Result<Config, playtally_core::ConfigError> {
    Config::load_or_default(path.map(Path::new))
}

/// JSON history store rooted at the configured data directory.
pub fn open_store(config: &Config) -> Result<JsonFileStore, playtally_core::ConfigError> {
    Ok(JsonFileStore::new(&config.data_dir, config.tz()?))
}

pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

/// Parse "5m", "30s", "1h", "100ms" into a Duration. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        (s, 1000)
    };

    let value: u64 = numeric
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {s}"))?;
    value
        .checked_mul(multiplier)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration out of range: {s}"))
}
