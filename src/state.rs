//! Persisted delta-tracking state, one JSON file per site.
//!
//! ```json
//! {
//!   "last_published": "2026-01-10T00:00:00Z",
//!   "posted_urls": ["https://secure.runescape.com/m=news/a"]
//! }
//! ```
//!
//! `posted_urls` may be absent (treated as empty) and is omitted on write when
//! empty. `last_published` accepts RFC 3339 datetimes as well as bare
//! `YYYY-MM-DD` dates, and is always written as RFC 3339 UTC.
//!
//! Loading never fails: a missing file and a corrupt file both mean "no prior
//! state", which makes the next run a cold start. They are reported as
//! distinct [`LoadOutcome`] variants so the difference shows up in logs.

use crate::error::StateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// The record that decides what has already been posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaState {
    /// Newest publication time among tracked articles.
    #[serde(with = "iso_timestamp")]
    pub last_published: DateTime<Utc>,
    /// URLs of tracked articles published at `last_published`. Only used for
    /// coarse sources.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub posted_urls: BTreeSet<String>,
}

impl DeltaState {
    pub fn new(last_published: DateTime<Utc>) -> Self {
        Self {
            last_published,
            posted_urls: BTreeSet::new(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        for url in &self.posted_urls {
            Url::parse(url).map_err(|e| format!("posted_urls entry {url:?}: {e}"))?;
        }
        Ok(())
    }
}

/// Result of reading the state file.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No state file exists yet.
    Missing,
    /// A state file exists but could not be used.
    Corrupt(String),
    Loaded(DeltaState),
}

impl LoadOutcome {
    /// The usable state, if any.
    pub fn into_state(self) -> Option<DeltaState> {
        match self {
            LoadOutcome::Loaded(state) => Some(state),
            LoadOutcome::Missing | LoadOutcome::Corrupt(_) => None,
        }
    }
}

/// Reads and atomically replaces the state file at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> LoadOutcome {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state file found; this run is a cold start");
                return LoadOutcome::Missing;
            }
            Err(e) => {
                warn!(error = %e, "State file unreadable; treating as cold start");
                return LoadOutcome::Corrupt(e.to_string());
            }
        };

        let state = match serde_json::from_str::<DeltaState>(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "State file is not valid JSON state; treating as cold start");
                return LoadOutcome::Corrupt(e.to_string());
            }
        };

        if let Err(reason) = state.validate() {
            warn!(%reason, "State file failed validation; treating as cold start");
            return LoadOutcome::Corrupt(reason);
        }

        debug!(
            last_published = %state.last_published,
            posted_urls = state.posted_urls.len(),
            "Loaded state"
        );
        LoadOutcome::Loaded(state)
    }

    /// Replace the state file with `state`.
    ///
    /// The record is written to a sibling temp file and renamed into place, so
    /// readers only ever see the old or the new record.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    pub async fn save(&self, state: &DeltaState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state)?;
        let io_err = |source: std::io::Error| StateError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, format!("{json}\n")).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        info!(
            last_published = %state.last_published,
            posted_urls = state.posted_urls.len(),
            "Saved state"
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Serde adapter for `last_published`.
mod iso_timestamp {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid ISO-8601 timestamp {raw:?}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}
