//! Data models shared by the sources, the delta detector and the notifier.
//!
//! - [`Article`]: one entry scraped from a site's news listing
//! - [`Granularity`]: how precise a source's publication timestamps are
//! - [`Site`]: the news sites this relay knows how to scrape

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A news article as listed on a site's news page.
///
/// Sources guarantee that `title` is non-empty and `url` is absolute.
/// For [`Granularity::Coarse`] sources `published` is midnight UTC of the
/// listed day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// The headline as shown on the listing.
    pub title: String,
    /// Absolute link to the article.
    pub url: String,
    /// Publication time, precise to the source's [`Granularity`].
    pub published: DateTime<Utc>,
}

/// Precision of the publication timestamps a source exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Day precision. Several articles can share a timestamp, so the set of
    /// already-posted URLs is needed to tell them apart.
    Coarse,
    /// Full datetime precision. Strict greater-than is unambiguous.
    Fine,
}

impl Granularity {
    /// Compare two timestamps at this granularity.
    ///
    /// Coarse comparison looks only at the UTC calendar date so a stored
    /// watermark that carries a time component still lines up with
    /// date-only articles.
    pub fn compare(self, a: &DateTime<Utc>, b: &DateTime<Utc>) -> Ordering {
        match self {
            Granularity::Coarse => a.date_naive().cmp(&b.date_naive()),
            Granularity::Fine => a.cmp(b),
        }
    }

    /// Whether the set of posted URLs is tracked for this granularity.
    pub fn tracks_urls(self) -> bool {
        matches!(self, Granularity::Coarse)
    }
}

/// The news sites this relay can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    /// Old School RuneScape news archive (date-only listings).
    Osrs,
    /// Path of Exile forum announcements (full timestamps).
    Poe,
}

impl Site {
    /// Short identifier used in file names and environment variables.
    pub fn key(self) -> &'static str {
        match self {
            Site::Osrs => "osrs",
            Site::Poe => "poe",
        }
    }

    /// Name of the per-site environment variable holding the webhook URL.
    pub fn webhook_env_var(self) -> String {
        format!("{}_WEBHOOK_URL", self.key().to_uppercase())
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
