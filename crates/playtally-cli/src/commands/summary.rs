use std::path::PathBuf;

use playtally_core::{build_summary, now_in, write_summary};

use super::CommandResult;

pub fn run(config_path: Option<&str>, output: Option<&str>) -> CommandResult {
    let config = super::load_config(config_path)?;
    let tz = config.tz()?;
    let store = super::open_store(&config)?;
    let summary = build_summary(&config.catalog(), &store, now_in(tz));

    match output.map(PathBuf::from).or_else(|| config.summary_path()) {
        Some(path) => {
            write_summary(&summary, &path)?;
            println!("Summary written to {} ({} items)", path.display(), summary.items.len());
        }
        None => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}
