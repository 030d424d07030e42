//! # Game News Relay
//!
//! Checks a game's official news page and posts every article that has not
//! been announced yet to a Discord channel, exactly once.
//!
//! Each invocation is a single short-lived run, meant to be triggered by cron
//! or a CI schedule. A small JSON state file carries what has already been
//! posted from one run to the next.
//!
//! ## Usage
//!
//! ```sh
//! OSRS_WEBHOOK_URL=https://discord.com/api/webhooks/... game_news_relay osrs
//! ```
//!
//! ## Architecture
//!
//! 1. **Load state**: read the site's state file (missing or corrupt = cold start)
//! 2. **Scrape**: fetch the news listing with linear retry and parse it
//! 3. **Diff**: pick the articles the state does not cover yet, oldest first
//! 4. **Notify**: post each one to the webhook, isolating per-article failures
//! 5. **Persist**: atomically write the advanced state
//!
//! ## Exit Status
//!
//! Non-zero only for configuration errors, an unrecognised listing page, or
//! an unwritable state file. Unreachable listings and failed posts are logged
//! and the run still exits successfully.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod delta;
mod error;
mod fetcher;
mod models;
mod notifier;
mod pipeline;
mod scrapers;
mod state;
mod utils;

use cli::Cli;
use config::{Config, FileConfig};
use fetcher::{HttpFetch, RetryFetch};
use models::Site;
use notifier::{DiscordWebhook, DryRun};
use pipeline::{Pipeline, RunReport};
use scrapers::{ArticleSource, osrs::Osrs, poe::Poe};
use state::StateStore;
use utils::ensure_writable_parent;

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
    let args = Cli::parse();
    info!(site = %args.site, "game_news_relay starting up");
    debug!(?args.config, ?args.state_file, dry_run = args.dry_run, "Parsed CLI arguments");

    let file = match &args.config {
        Some(path) => FileConfig::load(path),
        None => Ok(FileConfig::default()),
    };
    let config = match file.and_then(|file| Config::resolve(&args, file, |key| std::env::var(key).ok())) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration; refusing to run");
            return Err(e.into());
        }
    };

    if let Err(e) = ensure_writable_parent(&config.state_file).await {
        error!(
            path = %config.state_file.display(),
            error = %e,
            "State directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let fetcher = RetryFetch::new(
        HttpFetch::new(config.http_timeout)?,
        config.fetch_attempts,
        config.fetch_base_delay,
    );
    let listing_url = config.listing_url.clone();

    let report = match config.site {
        Site::Osrs => relay(Osrs::new(fetcher, listing_url, config.page_size), &config).await,
        Site::Poe => relay(Poe::new(fetcher, listing_url, config.page_size), &config).await,
    };

    let elapsed = start_time.elapsed();
    match report {
        Ok(report) => {
            info!(
                ?elapsed,
                outcome = ?report.outcome,
                listed = report.listed,
                detected = report.detected,
                delivered = report.delivered,
                failed = report.failed,
                state_written = report.saved.is_some(),
                "Execution complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(?elapsed, error = %e, "Run aborted; state left unchanged");
            Err(e)
        }
    }
}

/// Run the pipeline for `source` with the notifier `config` asks for.
#[instrument(level = "debug", skip_all)]
async fn relay<S: ArticleSource>(
    source: S,
    config: &Config,
) -> Result<RunReport, Box<dyn Error>> {
    let store = StateStore::new(config.state_file.clone());

    let report = if config.dry_run {
        info!("Dry run: articles will be logged, not posted");
        Pipeline::new(source, DryRun, store, config.advance_on).run().await?
    } else {
        let webhook = DiscordWebhook::new(
            config.webhook_url.clone(),
            config.http_timeout,
            config.notify_attempts,
            config.default_retry_after,
        )?;
        Pipeline::new(source, webhook, store, config.advance_on).run().await?
    };
    Ok(report)
}
