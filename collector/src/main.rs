mod aggregate;
mod app;
mod batch;
mod connectors;
mod model;
mod store;
#[cfg(test)]
mod testing;

use app::BatchMode;
use clap::{Parser, Subcommand};
use collector_core::{telemetry, Config};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[clap(name = "travel-collector")]
#[clap(about = "Collects travel data for places from public sources", version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate every source for one place and save the record
    Fetch {
        /// Place name, e.g. "Rio de Janeiro"
        place: String,

        /// Country name, e.g. "Brazil"
        country: String,

        /// Override the output directory
        #[clap(long, env = "TRAVEL_OUT")]
        out: Option<PathBuf>,
    },

    /// Enrich the master list, resuming from the checkpoint
    Batch {
        /// Override the master list path
        #[clap(long)]
        master: Option<PathBuf>,

        /// Override the checkpoint path
        #[clap(long)]
        checkpoint: Option<PathBuf>,

        /// Items processed between checkpoint writes
        #[clap(long)]
        chunk_size: Option<usize>,

        #[clap(long, value_enum, default_value_t = BatchMode::Climate)]
        mode: BatchMode,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Fatal error");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mut config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    telemetry::init(&config.telemetry)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch { place, country, out } => {
            if let Some(out) = out {
                config.output.dir = out;
            }

            info!(place = %place, country = %country, "Starting fetch");

            let app = app::App::new(config)?;
            let path = app.run_fetch(&place, &country).await?;
            println!("{}", path.display());
        }

        Commands::Batch { master, checkpoint, chunk_size, mode } => {
            if let Some(master) = master {
                config.batch.master_list = master;
            }
            if let Some(checkpoint) = checkpoint {
                config.batch.checkpoint = checkpoint;
            }
            if let Some(chunk_size) = chunk_size {
                anyhow::ensure!(chunk_size > 0, "--chunk-size must be greater than 0");
                config.batch.chunk_size = chunk_size;
            }

            let app = app::App::new(config)?;
            let summary = app.run_batch(mode).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    telemetry::shutdown();
    Ok(())
}
