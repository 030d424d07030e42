//! Error types for each stage of a relay run.
//!
//! Only [`ConfigError`], [`SourceError`] and [`StateError`] end a run early.
//! [`NotifyError`] is always handled per article by the pipeline, and fetch
//! exhaustion is not an error at all (see [`crate::fetcher`]).

use crate::models::Site;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid or missing configuration, detected before any network traffic.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no webhook URL configured for {site}; pass --webhook-url or set {env_var}")]
    MissingWebhook { site: Site, env_var: String },

    #[error("{field} is not a usable http(s) URL ({value}): {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} must be at least 1")]
    ZeroAttempts { field: &'static str },

    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// The listing page did not have the shape the scraper expects.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{site}: expected element `{selector}` not found in news listing")]
    MissingContainer { site: Site, selector: &'static str },

    #[error("{site}: invalid CSS selector `{selector}`")]
    Selector { site: Site, selector: &'static str },
}

/// A single article could not be delivered to the webhook.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook rejected message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("webhook still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// The state file could not be written.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to write state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that abort a run. State is left untouched when one is returned
/// before the write-back step.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    State(#[from] StateError),
}
