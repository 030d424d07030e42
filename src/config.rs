//! Run configuration, resolved once at startup.
//!
//! Values come from, highest precedence first:
//!
//! 1. command-line flags and their environment variables ([`Cli`])
//! 2. the optional YAML config file (`--config`)
//! 3. the per-site webhook variable, e.g. `OSRS_WEBHOOK_URL`
//! 4. built-in defaults
//!
//! # Config File
//!
//! ```yaml
//! fetch_attempts: 3
//! fetch_base_delay_ms: 2000
//! advance_on: attempted
//! sites:
//!   osrs:
//!     webhook_url: https://discord.com/api/webhooks/...
//!     state_file: state/osrs.json
//!   poe:
//!     webhook_url: https://discord.com/api/webhooks/...
//!     page_size: 20
//! ```

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::models::Site;
use crate::notifier::MAX_RETRY_AFTER;
use crate::scrapers::{osrs, poe};
use clap::ValueEnum;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
const DEFAULT_FETCH_BASE_DELAY_MS: u64 = 2_000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NOTIFY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_AFTER_SECS: f64 = 5.0;

/// Which posting attempts move the stored watermark forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvancePolicy {
    /// Every article the run tried to post, whether or not the webhook
    /// accepted it. A failed post is never retried.
    #[default]
    Attempted,
    /// Only articles the webhook accepted. Failed posts newer than the
    /// resulting watermark are retried on the next run.
    Delivered,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub site: Site,
    pub webhook_url: String,
    pub listing_url: String,
    pub state_file: PathBuf,
    pub page_size: usize,
    pub fetch_attempts: u32,
    pub fetch_base_delay: Duration,
    pub http_timeout: Duration,
    pub notify_attempts: u32,
    pub default_retry_after: Duration,
    pub advance_on: AdvancePolicy,
    pub dry_run: bool,
}

/// Shape of the YAML config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub fetch_attempts: Option<u32>,
    pub fetch_base_delay_ms: Option<u64>,
    pub http_timeout_secs: Option<u64>,
    pub notify_attempts: Option<u32>,
    pub default_retry_after_secs: Option<f64>,
    pub advance_on: Option<AdvancePolicy>,
    #[serde(default)]
    pub sites: HashMap<Site, SiteFileConfig>,
}

/// Per-site section of the config file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteFileConfig {
    pub webhook_url: Option<String>,
    pub listing_url: Option<String>,
    pub state_file: Option<PathBuf>,
    pub page_size: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Config {
    /// Resolve and validate the configuration for `cli.site`.
    ///
    /// `env` looks up environment variables; it is a parameter so tests can
    /// supply their own.
    pub fn resolve(
        cli: &Cli,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let site = cli.site;
        let site_file = file.sites.get(&site).cloned().unwrap_or_default();

        let env_var = site.webhook_env_var();
        let not_blank = |url: &String| !url.trim().is_empty();
        let webhook_url = cli
            .webhook_url
            .clone()
            .filter(not_blank)
            .or(site_file.webhook_url.filter(not_blank))
            .or_else(|| env(&env_var).filter(not_blank))
            .ok_or_else(|| ConfigError::MissingWebhook {
                site,
                env_var: env_var.clone(),
            })?;
        validate_http_url("webhook_url", webhook_url.trim())?;

        let listing_url = cli
            .listing_url
            .clone()
            .or(site_file.listing_url)
            .unwrap_or_else(|| default_listing_url(site).to_string());
        validate_http_url("listing_url", &listing_url)?;

        let fetch_attempts = cli
            .fetch_attempts
            .or(file.fetch_attempts)
            .unwrap_or(DEFAULT_FETCH_ATTEMPTS);
        if fetch_attempts == 0 {
            return Err(ConfigError::ZeroAttempts {
                field: "fetch_attempts",
            });
        }
        let notify_attempts = file.notify_attempts.unwrap_or(DEFAULT_NOTIFY_ATTEMPTS);
        if notify_attempts == 0 {
            return Err(ConfigError::ZeroAttempts {
                field: "notify_attempts",
            });
        }

        let default_retry_after = file
            .default_retry_after_secs
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        let config = Config {
            site,
            webhook_url: webhook_url.trim().to_string(),
            listing_url,
            state_file: cli
                .state_file
                .clone()
                .or(site_file.state_file)
                .unwrap_or_else(|| PathBuf::from(format!("state/{}.json", site.key()))),
            page_size: cli
                .page_size
                .or(site_file.page_size)
                .unwrap_or_else(|| default_page_size(site)),
            fetch_attempts,
            fetch_base_delay: Duration::from_millis(
                file.fetch_base_delay_ms.unwrap_or(DEFAULT_FETCH_BASE_DELAY_MS),
            ),
            http_timeout: Duration::from_secs(
                file.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            notify_attempts,
            default_retry_after: Duration::from_secs_f64(
                default_retry_after.min(MAX_RETRY_AFTER.as_secs_f64()),
            ),
            advance_on: cli.advance_on.or(file.advance_on).unwrap_or_default(),
            dry_run: cli.dry_run,
        };
        debug!(
            site = %config.site,
            listing_url = %config.listing_url,
            state_file = %config.state_file.display(),
            advance_on = ?config.advance_on,
            "Resolved configuration"
        );
        Ok(config)
    }
}

fn default_listing_url(site: Site) -> &'static str {
    match site {
        Site::Osrs => osrs::LISTING_URL,
        Site::Poe => poe::LISTING_URL,
    }
}

fn default_page_size(site: Site) -> usize {
    match site {
        Site::Osrs => osrs::PAGE_SIZE,
        Site::Poe => poe::PAGE_SIZE,
    }
}

fn validate_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(()),
        "http" | "https" => Err(invalid("missing host".to_string())),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}
