//! One relay run: load state, scrape, diff, notify, persist.
//!
//! The pipeline is generic over the [`ArticleSource`] and the [`Notify`]
//! implementation, so every site shares the same delivery and state logic.
//!
//! # Failure Handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Listing fetch exhausted retries | Empty listing, state untouched, run succeeds |
//! | Listing structure unrecognised | [`RunError::Source`], state untouched |
//! | One article fails to post | Logged, remaining articles still posted |
//! | State file cannot be written | [`RunError::State`] |

use crate::config::AdvancePolicy;
use crate::delta::{DeltaDetector, is_unposted, tracked_state};
use crate::error::RunError;
use crate::models::Article;
use crate::notifier::Notify;
use crate::scrapers::ArticleSource;
use crate::state::{DeltaState, LoadOutcome, StateStore};
use tracing::{error, info, instrument, warn};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No usable prior state; a baseline was recorded and nothing posted.
    ColdStart,
    /// The listing held nothing new.
    NothingNew,
    /// New articles were found and posting was attempted.
    Posted,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Articles found in the listing.
    pub listed: usize,
    /// Articles detected as not yet posted.
    pub detected: usize,
    pub delivered: usize,
    pub failed: usize,
    /// State written at the end of the run, if any.
    pub saved: Option<DeltaState>,
}

impl RunReport {
    fn early(outcome: RunOutcome, listed: usize) -> Self {
        Self {
            outcome,
            listed,
            detected: 0,
            delivered: 0,
            failed: 0,
            saved: None,
        }
    }
}

/// Relay pipeline for a single site.
#[derive(Debug)]
pub struct Pipeline<S, N> {
    source: S,
    notifier: N,
    store: StateStore,
    advance_on: AdvancePolicy,
}

impl<S: ArticleSource, N: Notify> Pipeline<S, N> {
    /// Assemble a pipeline for one site.
    ///
    /// # Arguments
    ///
    /// * `source` - Where articles are listed from.
    /// * `notifier` - Where new articles are posted.
    /// * `store` - The site's state file.
    /// * `advance_on` - Which posting attempts move the watermark.
    pub fn new(source: S, notifier: N, store: StateStore, advance_on: AdvancePolicy) -> Self {
        Self {
            source,
            notifier,
            store,
            advance_on,
        }
    }

    /// Execute one relay run.
    ///
    /// # Returns
    ///
    /// A [`RunReport`] on success. Errors only when the listing structure is
    /// unrecognised or the state file cannot be written.
    #[instrument(level = "info", skip_all, fields(site = %self.source.site()))]
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let previous = match self.store.load().await {
            LoadOutcome::Corrupt(reason) => {
                warn!(
                    path = %self.store.path().display(),
                    %reason,
                    "Discarding corrupt state; establishing a new baseline"
                );
                None
            }
            outcome => outcome.into_state(),
        };
        let articles = self.source.list().await?;
        let listed = articles.len();

        let granularity = self.source.granularity();
        let detector = DeltaDetector::new(&self.store, granularity, self.source.page_size());
        let unposted = detector.unposted(previous.as_ref(), &articles).await?;

        if previous.is_none() {
            return Ok(RunReport::early(RunOutcome::ColdStart, listed));
        }
        if unposted.is_empty() {
            info!(listed, "No new articles");
            return Ok(RunReport::early(RunOutcome::NothingNew, listed));
        }
        info!(listed, detected = unposted.len(), "Posting new articles");

        let mut delivered: Vec<&Article> = Vec::with_capacity(unposted.len());
        let mut failed: Vec<&Article> = Vec::new();
        for article in &unposted {
            match self.notifier.post(article).await {
                Ok(()) => {
                    info!(title = %article.title, url = %article.url, "Posted article");
                    delivered.push(article);
                }
                Err(e) => {
                    error!(title = %article.title, url = %article.url, error = %e, "Failed to post article");
                    failed.push(article);
                }
            }
        }

        let counted: Vec<&Article> = match self.advance_on {
            AdvancePolicy::Attempted => unposted.iter().collect(),
            AdvancePolicy::Delivered if granularity.tracks_urls() => delivered.clone(),
            // Without URL tracking a watermark on a failed article's instant
            // would hide it for good, so deliveries sharing that instant are
            // not counted and may be posted again alongside the retry.
            AdvancePolicy::Delivered => delivered
                .iter()
                .copied()
                .filter(|d| {
                    let shares_failure = failed.iter().any(|f| f.published == d.published);
                    if shares_failure {
                        warn!(
                            url = %d.url,
                            "Delivered article shares a timestamp with a failed one; not counted toward the watermark"
                        );
                    }
                    !shares_failure
                })
                .collect(),
        };
        let next = tracked_state(previous.as_ref(), &counted, granularity);

        if self.advance_on == AdvancePolicy::Delivered {
            match &next {
                Some(next) => {
                    for article in &failed {
                        if is_unposted(next, article, granularity) {
                            warn!(url = %article.url, "Failed article will be retried next run");
                        } else {
                            error!(
                                url = %article.url,
                                "Failed article is older than a delivered one and will not be retried"
                            );
                        }
                    }
                }
                None if !failed.is_empty() => {
                    warn!(failed = failed.len(), "Nothing delivered; state left unchanged for retry");
                }
                None => {}
            }
        }

        if let Some(next) = &next {
            self.store.save(next).await?;
        }

        let report = RunReport {
            outcome: RunOutcome::Posted,
            listed,
            detected: unposted.len(),
            delivered: delivered.len(),
            failed: failed.len(),
            saved: next,
        };
        info!(
            detected = report.detected,
            delivered = report.delivered,
            failed = report.failed,
            "Run complete"
        );
        Ok(report)
    }
}
