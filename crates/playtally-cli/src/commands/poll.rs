use std::sync::Arc;

use playtally_core::{
    HttpFetcher, IngestionPolicy, ItemOutcome, PollReport, Scheduler, format_timestamp, now_in,
};

use super::CommandResult;

pub fn run(config_path: Option<&str>) -> CommandResult {
    let config = super::load_config(config_path)?;
    let tz = config.tz()?;
    let scheduler = Scheduler::new(
        config.catalog(),
        Arc::new(HttpFetcher::new(&config.fetch)?),
        Arc::new(super::open_store(&config)?),
        IngestionPolicy::new(tz),
        &config.scheduler,
    )
    .with_summary(config.summary_path());

    let report = super::runtime()?.block_on(scheduler.poll_once(now_in(tz)));
    print_report(&report);
    Ok(())
}

fn print_report(report: &PollReport) {
    println!("Poll at {}", format_timestamp(&report.started_at));
    for (id, outcome) in &report.outcomes {
        println!("  {id:<20} {}", describe(outcome));
    }
    println!(
        "{} appended, {} skipped, {} failed",
        report.appended(),
        report.skipped(),
        report.failed()
    );
}

fn describe(outcome: &ItemOutcome) -> String {
    match outcome {
        ItemOutcome::Appended(sample) => {
            format!("appended {}", playtally_core::group_digits(sample.value))
        }
        ItemOutcome::Skipped(rejection) => format!("skipped: {rejection}"),
        ItemOutcome::Failed(e) => format!("failed: {e}"),
    }
}
