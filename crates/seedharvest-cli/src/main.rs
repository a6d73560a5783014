//! seedharvest CLI: run entropy poll passes and inspect what each source
//! delivered.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "seedharvest")]
#[command(about = "seedharvest — poll OS timers, counters and kernel state for seed material")]
#[command(version = seedharvest_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run poll passes and print what every source delivered
    Poll {
        /// Number of passes; 0 polls until Ctrl+C
        #[arg(long, default_value = "1")]
        count: usize,

        /// Delay between passes in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// JSON harvest config (credits, buffer sizes, timeout, toggle variable)
        #[arg(long)]
        config: Option<String>,

        /// Print one JSON report per pass instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show how the hardware-counter toggle resolves in this environment
    Toggle {
        /// Environment variable to inspect (default: USE_HARDWARE_COUNTERS)
        #[arg(long)]
        var: Option<String>,
    },

    /// Print the default harvest config as JSON
    Config,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Poll {
            count,
            interval_ms,
            config,
            json,
        } => commands::poll::run(commands::poll::PollCommandConfig {
            count,
            interval_ms,
            config_path: config.as_deref(),
            json,
        }),
        Commands::Toggle { var } => commands::toggle::run(var.as_deref()),
        Commands::Config => commands::config::run(),
    }
}
