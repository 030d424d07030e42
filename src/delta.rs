//! Deciding which scraped articles have not been posted yet.
//!
//! The decision is a pure function of the persisted [`DeltaState`], the fresh
//! listing and the source's [`Granularity`]:
//!
//! - **Cold start** (no state): nothing is posted. The newest timestamp in the
//!   listing becomes the baseline so the first run does not flood the channel
//!   with the site's whole back catalogue.
//! - **Fine** sources: an article is new iff it is strictly newer than
//!   `last_published`.
//! - **Coarse** sources: an article is new iff its day is after the
//!   `last_published` day, or on that day with a URL not in `posted_urls`.
//!
//! New articles are returned oldest first; ties keep listing order.

use crate::error::StateError;
use crate::models::{Article, Granularity};
use crate::state::{DeltaState, StateStore};
use itertools::Itertools;
use std::cmp::Ordering;
use tracing::{debug, info, instrument, warn};

/// Outcome of comparing a listing against the stored state.
#[derive(Debug, PartialEq, Eq)]
pub enum Delta {
    /// No prior state. Holds the baseline to persist, or `None` when the
    /// listing was empty and there is nothing to anchor on.
    ColdStart(Option<DeltaState>),
    /// Articles to post, oldest first. May be empty.
    Unposted(Vec<Article>),
}

/// Compare `articles` against `state`.
pub fn detect(
    state: Option<&DeltaState>,
    articles: &[Article],
    granularity: Granularity,
    page_size: Option<usize>,
) -> Delta {
    let articles = articles.iter().unique_by(|a| a.url.clone()).collect::<Vec<_>>();

    let Some(state) = state else {
        return Delta::ColdStart(tracked_state(None, &articles, granularity));
    };

    if may_have_skipped(state, &articles, granularity, page_size) {
        warn!(
            page_size = page_size.unwrap_or_default(),
            last_published = %state.last_published,
            "Every listed article is newer than the last run; older unseen articles may have been skipped"
        );
    }

    let unposted = articles
        .into_iter()
        .filter(|&a| is_unposted(state, a, granularity))
        .sorted_by_key(|a| a.published)
        .cloned()
        .collect();
    Delta::Unposted(unposted)
}

/// Whether `article` is not yet covered by `state`.
///
/// Newer than the watermark, or on it with an untracked URL when the
/// granularity tracks URLs.
pub fn is_unposted(state: &DeltaState, article: &Article, granularity: Granularity) -> bool {
    match granularity.compare(&article.published, &state.last_published) {
        Ordering::Greater => true,
        Ordering::Equal => granularity.tracks_urls() && !state.posted_urls.contains(&article.url),
        Ordering::Less => false,
    }
}

/// A full page where every entry is newer than the watermark means the
/// listing may have scrolled past articles this relay never saw.
fn may_have_skipped(
    state: &DeltaState,
    articles: &[&Article],
    granularity: Granularity,
    page_size: Option<usize>,
) -> bool {
    let Some(page_size) = page_size.filter(|&n| n > 0) else {
        return false;
    };
    articles.len() >= page_size
        && articles
            .iter()
            .all(|a| granularity.compare(&a.published, &state.last_published) == Ordering::Greater)
}

/// State after tracking `counted` on top of `previous`.
///
/// `last_published` becomes the newest counted timestamp. For coarse sources
/// `posted_urls` holds the counted URLs on that day, plus the previously
/// tracked ones when the day has not moved. Returns `None` when nothing was
/// counted or the result would move the watermark backwards.
pub fn tracked_state(
    previous: Option<&DeltaState>,
    counted: &[&Article],
    granularity: Granularity,
) -> Option<DeltaState> {
    let newest = counted.iter().map(|a| a.published).max()?;

    let mut next = DeltaState::new(newest);
    if granularity.tracks_urls() {
        next.posted_urls = counted
            .iter()
            .filter(|a| granularity.compare(&a.published, &newest) == Ordering::Equal)
            .map(|a| a.url.clone())
            .collect();
    }

    if let Some(previous) = previous {
        match granularity.compare(&newest, &previous.last_published) {
            Ordering::Less => return None,
            Ordering::Equal if granularity.tracks_urls() => {
                next.posted_urls.extend(previous.posted_urls.iter().cloned());
            }
            _ => {}
        }
    }
    Some(next)
}

/// [`detect`] bound to a state store, so a cold start persists its baseline.
#[derive(Debug)]
pub struct DeltaDetector<'a> {
    store: &'a StateStore,
    granularity: Granularity,
    page_size: Option<usize>,
}

impl<'a> DeltaDetector<'a> {
    pub fn new(store: &'a StateStore, granularity: Granularity, page_size: Option<usize>) -> Self {
        Self {
            store,
            granularity,
            page_size,
        }
    }

    /// Articles in `articles` not yet reflected in `state`, oldest first.
    ///
    /// On a cold start the baseline is saved and the result is empty.
    #[instrument(level = "info", skip_all, fields(candidates = articles.len()))]
    pub async fn unposted(
        &self,
        state: Option<&DeltaState>,
        articles: &[Article],
    ) -> Result<Vec<Article>, StateError> {
        match detect(state, articles, self.granularity, self.page_size) {
            Delta::ColdStart(Some(baseline)) => {
                info!(
                    last_published = %baseline.last_published,
                    posted_urls = baseline.posted_urls.len(),
                    "Cold start: recording baseline without posting"
                );
                self.store.save(&baseline).await?;
                Ok(Vec::new())
            }
            Delta::ColdStart(None) => {
                info!("Cold start with an empty listing; nothing to record");
                Ok(Vec::new())
            }
            Delta::Unposted(unposted) => {
                debug!(count = unposted.len(), "Computed unposted articles");
                Ok(unposted)
            }
        }
    }
}
