use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;
use playtally_core::{
    GapFilter, Sample, SampleRecord, SeriesStore, read_csv_records, read_records,
    records_to_series, write_json_atomic,
};

use super::CommandResult;

pub struct CompactCommandConfig<'a> {
    pub config_path: Option<&'a str>,
    pub item: Option<&'a str>,
    pub input: Option<&'a str>,
    pub output: Option<&'a str>,
    pub threshold: Duration,
    pub tolerance: Duration,
}

pub fn run(cfg: CompactCommandConfig) -> CommandResult {
    let config = super::load_config(cfg.config_path)?;
    let tz = config.tz()?;
    let store = super::open_store(&config)?;
    let filter = GapFilter::new(
        TimeDelta::from_std(cfg.threshold)?,
        TimeDelta::from_std(cfg.tolerance)?,
    );

    let (source, samples) = match (cfg.item, cfg.input) {
        (Some(id), _) => {
            let item = config
                .catalog()
                .get(id)
                .cloned()
                .ok_or_else(|| format!("unknown item '{id}'"))?;
            let series = store.load(item.history())?;
            (store.resolve(item.history()), series.into_samples())
        }
        (None, Some(input)) => {
            let path = PathBuf::from(input);
            let samples = load_input(&path, tz)?;
            (path, samples)
        }
        (None, None) => return Err("either --item or --input is required".into()),
    };

    let output = match cfg.output {
        Some(p) => PathBuf::from(p),
        None => compacted_path(&source),
    };
    if output == source {
        return Err(format!("refusing to overwrite the input {}", source.display()).into());
    }

    let kept = compact_to(&filter, &samples, &output)?;
    println!(
        "Compacted {} -> {} (kept {} of {}, min spacing {} min)",
        source.display(),
        output.display(),
        kept,
        samples.len(),
        filter.min_spacing().num_minutes()
    );
    Ok(())
}

/// Read a JSON history or a legacy CSV (chosen by extension).
fn load_input(path: &Path, tz: Tz) -> Result<Vec<Sample>, playtally_core::StoreError> {
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    let records = if is_csv {
        read_csv_records(path)?
    } else {
        read_records(path)?.unwrap_or_default()
    };
    Ok(records_to_series(path, &records, tz)?.into_samples())
}

/// Apply `filter` and write the result in the history record format.
fn compact_to(filter: &GapFilter, samples: &[Sample], output: &Path) -> std::io::Result<usize> {
    let kept = filter.apply(samples);
    let records: Vec<SampleRecord> = kept.iter().map(Sample::to_record).collect();
    write_json_atomic(output, &records)?;
    Ok(kept.len())
}

/// `data/firestorm_history.json` → `data/firestorm_history_compacted.json`.
fn compacted_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "history".to_string());
    source.with_file_name(format!("{stem}_compacted.json"))
}
