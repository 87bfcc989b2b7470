#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for preparing boundary extracts.
//!
//! Uses `indicatif-log-bridge` (via [`osm_extract_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and download bars never fight for the terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory as _, Parser, Subcommand};
use osm_extract_cache::HttpFetcher;
use osm_extract_cli_utils::{IndicatifProgress, download_progress};
use osm_extract_pipeline::config::load_config;
use osm_extract_pipeline::{ExtractPipeline, OsmiumRunner, SyncOptions};

#[derive(Parser)]
#[command(
    name = "osm_extract",
    about = "Clip OpenStreetMap extracts to user-supplied boundaries"
)]
struct Cli {
    /// TOML config file (defaults to `./osm_extract.toml` if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory containing `<region>/<boundary>.geojson` files
    #[arg(long, global = true)]
    input_dir: Option<PathBuf>,
    /// Directory receiving clipped extracts and `manifest.json`
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// Directory caching the region index and full region extracts
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cache path, download URL, and name for the smallest region
    /// containing a boundary
    FindSmallest {
        /// Boundary `GeoJSON` file
        boundary: PathBuf,
    },
    /// Clip the smallest enclosing region's extract to one boundary
    Clip {
        /// Boundary `GeoJSON` file under the input directory
        boundary: PathBuf,
    },
    /// Clip every boundary under the input directory
    SyncAll {
        /// Skip boundaries whose output file already exists
        #[arg(long)]
        skip_existing: bool,
        /// Stop at the first failing boundary instead of continuing
        #[arg(long)]
        fail_fast: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = osm_extract_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        eprintln!("Unknown command");
        Cli::command().print_help()?;
        std::process::exit(2);
    };

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.input_dir {
        config.input_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }

    let fetcher = Arc::new(HttpFetcher::new(download_progress(&multi))?);
    let tools = Arc::new(OsmiumRunner::new(config.osmium_bin.clone()));
    let pipeline = ExtractPipeline::new(config, fetcher, tools);

    match command {
        Commands::FindSmallest { boundary } => {
            let resolution = pipeline.find_smallest(&boundary).await?;
            println!("{}", resolution.cache_path.display());
            println!("{}", resolution.url);
            println!("{}", resolution.friendly_name);
        }
        Commands::Clip { boundary } => {
            let outcome = pipeline.run(&boundary).await?;
            println!("{}", outcome.output_path.display());
        }
        Commands::SyncAll {
            skip_existing,
            fail_fast,
        } => {
            let start = Instant::now();
            let progress = IndicatifProgress::steps_bar(&multi, "Syncing boundaries");
            let options = SyncOptions {
                skip_existing,
                fail_fast,
            };
            let summary = pipeline.sync_all(options, progress).await?;

            log::info!(
                "Sync complete: {summary} in {:.1}s",
                start.elapsed().as_secs_f64()
            );
            for (path, e) in &summary.failures {
                log::error!("  {}: {e}", path.display());
            }
            if !summary.is_success() {
                return Err(format!("{} boundaries failed", summary.failures.len()).into());
            }
        }
    }

    Ok(())
}
