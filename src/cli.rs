//! Command-line interface definitions.
//!
//! Every option can also be supplied through an environment variable, which
//! is how the scheduler usually passes the webhook secret.

use crate::config::AdvancePolicy;
use crate::models::Site;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for one relay run.
///
/// # Examples
///
/// ```sh
/// # Webhook from the per-site variable
/// OSRS_WEBHOOK_URL=https://discord.com/api/webhooks/... game_news_relay osrs
///
/// # Explicit state file and a YAML config
/// game_news_relay poe -c relay.yaml -s state/poe.json
///
/// # Log what would be posted without calling the webhook
/// game_news_relay osrs --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Site whose news listing to check
    #[arg(value_enum)]
    pub site: Site,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "NEWS_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Discord webhook URL (falls back to the config file, then <SITE>_WEBHOOK_URL)
    #[arg(short, long, env = "WEBHOOK_URL", hide_env_values = true)]
    pub webhook_url: Option<String>,

    /// Path of the JSON state file [default: state/<site>.json]
    #[arg(short, long, env = "STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Override the site's news listing URL
    #[arg(long)]
    pub listing_url: Option<String>,

    /// Number of entries the listing page shows
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Attempts at fetching the listing before giving up for this run
    #[arg(long)]
    pub fetch_attempts: Option<u32>,

    /// Which articles move the state forward
    #[arg(long, value_enum)]
    pub advance_on: Option<AdvancePolicy>,

    /// Log articles instead of posting them (state is still updated)
    #[arg(long)]
    pub dry_run: bool,
}
