//! CLI for playtally: hourly play-count history for a handful of songs.

mod commands;

use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "playtally")]
#[command(about = "playtally: hourly play-count history and rolling stats")]
#[command(version = playtally_core::VERSION)]
struct Cli {
    /// TOML config file (built-in catalog and defaults when omitted)
    #[arg(long, global = true, env = "PLAYTALLY_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the HTTP dashboard until Ctrl-C
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Poll every tracked item once now and regenerate the summary.
    /// Ignores the poll interval; the hour-bucket rule still applies.
    Poll,

    /// Write the summary artifact
    Summary {
        /// Output path (defaults to the configured summary file, or stdout if disabled)
        #[arg(long)]
        output: Option<String>,
    },

    /// Print current stats for every tracked item
    Show {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Downsample a history to roughly hourly spacing and write it as a separate export.
    /// The newest sample is always kept.
    Compact {
        /// Tracked item whose history to compact
        #[arg(long, conflicts_with = "input", required_unless_present = "input")]
        item: Option<String>,

        /// JSON or legacy CSV (timestamp,play_count) history file to compact
        #[arg(long)]
        input: Option<String>,

        /// Output path (default: <name>_compacted.json next to the input)
        #[arg(long)]
        output: Option<String>,

        /// Target spacing between kept samples (e.g. 60m, 1h)
        #[arg(long, default_value = "60m", value_parser = commands::parse_duration)]
        threshold: Duration,

        /// Slack subtracted from the threshold (e.g. 5m)
        #[arg(long, default_value = "5m", value_parser = commands::parse_duration)]
        tolerance: Duration,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config, &host, port),
        Commands::Poll => commands::poll::run(config),
        Commands::Summary { output } => commands::summary::run(config, output.as_deref()),
        Commands::Show { json } => commands::show::run(config, json),
        Commands::Compact {
            item,
            input,
            output,
            threshold,
            tolerance,
        } => commands::compact::run(commands::compact::CompactCommandConfig {
            config_path: config,
            item: item.as_deref(),
            input: input.as_deref(),
            output: output.as_deref(),
            threshold,
            tolerance,
        }),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
