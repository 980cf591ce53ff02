use std::sync::Arc;

use playtally_core::{HttpFetcher, IngestionPolicy, Scheduler};
use playtally_server::AppState;
use tokio_util::sync::CancellationToken;

use super::CommandResult;

pub fn run(config_path: Option<&str>, host: &str, port: u16) -> CommandResult {
    let config = super::load_config(config_path)?;
    let tz = config.tz()?;
    let store = Arc::new(super::open_store(&config)?);
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let catalog = config.catalog();
    let item_count = catalog.len();

    let scheduler = Scheduler::new(
        catalog.clone(),
        fetcher,
        store.clone(),
        IngestionPolicy::new(tz),
        &config.scheduler,
    )
    .with_summary(config.summary_path());
    let state = AppState::new(catalog, store, tz, scheduler.subscribe());

    let base = format!("http://{host}:{port}");
    println!("playtally v{}", playtally_core::VERSION);
    println!("   {base}");
    println!(
        "   {} tracked items, polling every {}s, data in {}",
        item_count,
        config.scheduler.poll_interval_secs,
        config.data_dir.display()
    );
    println!();
    println!("   Endpoints:");
    println!("     GET /                    Dashboard");
    println!("     GET /api                 API index");
    println!("     GET /api/v1/items        Stats for every item");
    println!("     GET /api/v1/items/{{id}}   Stats plus history for one item");
    println!("     GET /api/v1/summary      Summary artifact");
    println!("     GET /health              Last and next poll");
    println!();

    let rt = super::runtime()?;
    rt.block_on(async move {
        let cancel = CancellationToken::new();

        let on_signal = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("shutting down");
                    on_signal.cancel();
                }
                Err(e) => log::error!("failed to listen for Ctrl-C: {e}"),
            }
        });

        let poller = tokio::spawn(scheduler.run(cancel.clone()));
        let served = playtally_server::run_server(state, host, port, cancel.clone()).await;
        // Stop the scheduler on server exit, clean or not.
        cancel.cancel();
        if let Err(e) = poller.await {
            log::error!("scheduler task failed: {e}");
        }
        served
    })?;
    Ok(())
}
