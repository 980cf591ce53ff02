use chrono::DateTime;
use chrono_tz::Tz;
use playtally_core::{
    AggregateView, SeriesStore, TrackedItem, aggregate, format_timestamp, group_digits,
    load_or_empty, now_in, signed,
};

use super::CommandResult;

const UNAVAILABLE: &str = "unavailable";

pub fn run(config_path: Option<&str>, json: bool) -> CommandResult {
    let config = super::load_config(config_path)?;
    let tz = config.tz()?;
    let store = super::open_store(&config)?;
    let now = now_in(tz);
    let catalog = config.catalog();

    if json {
        let views: Vec<serde_json::Value> = catalog
            .items()
            .iter()
            .map(|item| {
                let (view, warning) = item_view(&store, item, now);
                serde_json::json!({
                    "id": item.id,
                    "title": item.title,
                    "view": view,
                    "warning": warning,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!("Play counts at {}", format_timestamp(&now));
    for item in catalog.items() {
        let (view, warning) = item_view(&store, item, now);
        println!();
        print!("{}", render_item(item, &view));
        if let Some(w) = warning {
            println!("  warning: {w}");
        }
    }
    Ok(())
}

fn item_view(
    store: &dyn SeriesStore,
    item: &TrackedItem,
    now: DateTime<Tz>,
) -> (AggregateView, Option<String>) {
    let (series, warning) = load_or_empty(store, item.history());
    (
        aggregate(series.samples(), now),
        warning.map(|e| e.to_string()),
    )
}

fn render_item(item: &TrackedItem, view: &AggregateView) -> String {
    let field = |value: Option<String>| value.unwrap_or_else(|| UNAVAILABLE.to_string());

    let mut out = format!("{} ({})\n", item.title, item.id);
    let rows = [
        ("current", field(view.latest.map(|s| group_digits(s.value)))),
        (
            "last sample",
            field(view.latest.map(|s| format_timestamp(&s.timestamp))),
        ),
        ("samples", view.sample_count.to_string()),
        ("total increase", field(view.total_increase.map(signed))),
        (
            "average rate",
            field(view.average_rate.map(|r| format!("{r:.2} plays/min"))),
        ),
        ("last hour", field(view.hour.map(|w| signed(w.delta)))),
        ("last 24h", field(view.day.map(|w| signed(w.delta)))),
    ];
    for (label, value) in rows {
        out.push_str(&format!("  {label:<16}{value}\n"));
    }
    out
}
