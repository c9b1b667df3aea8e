//! # Comic Archive
//!
//! A batch job that archives daily comic strips from GoComics into a
//! date-partitioned directory tree, skipping anything already archived.
//!
//! ## Usage
//!
//! ```sh
//! comic_archive --feeds garfield,bignate --days-past 7 --base-dir /srv
//! ```
//!
//! ## Architecture
//!
//! One run is a single sequential pass:
//! 1. **Configuration**: Merge flags, environment and the optional YAML file; validate feeds
//! 2. **Probing**: Skip (feed, date) pairs that already have an image or a missing marker
//! 3. **Resolving**: Load the strip's page and download its image
//! 4. **Archiving**: Write the image, a terminal-miss marker, or nothing (retry next run)
//!
//! Failures are logged and never change the exit code. Bad configuration or
//! an unwritable base directory skips the run. The process only exits
//! non-zero when the HTTP client behind the page renderer cannot be built.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod archive;
mod cli;
mod config;
mod models;
mod render;
mod runner;
mod scrapers;
mod utils;

use cli::Cli;
use config::Settings;
use render::HttpRenderer;
use runner::Runner;
use scrapers::Resolver;
use scrapers::gocomics::GoComics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("comic_archive starting up");

    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            error!(error = %e, "Invalid command line; skipping run");
            info!(elapsed = ?start_time.elapsed(), "Run skipped");
            return Ok(());
        }
    };
    debug!(?args, "Parsed CLI arguments");

    let Some(settings) = load_settings(args).await else {
        info!(elapsed = ?start_time.elapsed(), "Run skipped");
        return Ok(());
    };

    let renderer = match HttpRenderer::new(&settings.user_agent, settings.timeout) {
        Ok(renderer) => renderer,
        Err(e) => {
            error!(error = %e, "Failed to initialize the page renderer");
            return Err(e.into());
        }
    };
    let resolver = Resolver::GoComics(GoComics::new(renderer, settings.source_base_url.clone()));

    let today = settings.today.unwrap_or_else(|| Local::now().date_naive());
    let runner = Runner::new(resolver, settings.base_dir.clone(), settings.days_past);
    let mut summary = runner.run(&settings.feeds, today).await;
    summary.rejected_feeds = settings.rejected_feeds.len();

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        pairs = summary.total(),
        writes = summary.writes(),
        errored = summary.errored,
        rejected_feeds = summary.rejected_feeds,
        "Execution complete"
    );

    Ok(())
}

/// Merge configuration and prepare the archive root.
///
/// Returns `None`, after logging why, when the run has to be skipped.
async fn load_settings(args: Cli) -> Option<Settings> {
    let settings = match Settings::from_cli(args) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration; skipping run");
            return None;
        }
    };
    info!(
        feeds = ?settings.feeds.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
        days_past = settings.days_past,
        base_dir = %settings.base_dir.display(),
        "Loaded configuration"
    );

    if let Err(e) = archive::prepare_root(&settings.base_dir).await {
        error!(
            path = %settings.base_dir.display(),
            error = %e,
            "Base directory is not writable (fix perms or choose a different path); skipping run"
        );
        return None;
    }
    Some(settings)
}
