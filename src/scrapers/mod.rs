//! News listing scrapers, one per site.
//!
//! Every scraper implements [`ArticleSource`]: it performs a single resilient
//! fetch of the site's listing page and turns it into [`Article`]s.
//!
//! # Supported Sources
//!
//! | Site | Module | Timestamps | Notes |
//! |------|--------|------------|-------|
//! | Old School RuneScape | [`osrs`] | date only | News archive page |
//! | Path of Exile | [`poe`] | full datetime | Forum announcements board |
//!
//! # Failure Modes
//!
//! - Fetch retries exhausted: logged, returns an empty list (not an error)
//! - Expected listing container missing: [`SourceError::MissingContainer`]
//! - Individual malformed entries: logged and skipped

pub mod osrs;
pub mod poe;

use crate::error::SourceError;
use crate::models::{Article, Granularity, Site};
use scraper::{ElementRef, Selector};
use tracing::warn;
use url::Url;

/// A site whose news listing can be turned into articles.
pub trait ArticleSource {
    fn site(&self) -> Site;

    fn granularity(&self) -> Granularity;

    /// How many entries the listing page shows, when known.
    fn page_size(&self) -> Option<usize>;

    /// Fetch the listing and parse it.
    async fn list(&self) -> Result<Vec<Article>, SourceError>;
}

pub(crate) fn selector(site: Site, css: &'static str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|_| SourceError::Selector { site, selector: css })
}

/// Whitespace-normalised text content of an element.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a listing link against the page URL, keeping only http(s) links.
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let resolved = base.join(href.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Build an [`Article`] if the title is non-empty, logging why not otherwise.
pub(crate) fn article(
    site: Site,
    title: String,
    url: Option<String>,
    published: Option<chrono::DateTime<chrono::Utc>>,
) -> Option<Article> {
    match (title.is_empty(), url, published) {
        (false, Some(url), Some(published)) => Some(Article {
            title,
            url,
            published,
        }),
        (_, url, published) => {
            warn!(
                %site,
                %title,
                url = url.as_deref().unwrap_or("<missing>"),
                has_date = published.is_some(),
                "Skipping malformed listing entry"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_link_relative() {
        let base = Url::parse("https://www.pathofexile.com/forum/view-forum/news").unwrap();

        assert_eq!(
            resolve_link(&base, "/forum/view-thread/123"),
            Some("https://www.pathofexile.com/forum/view-thread/123".to_string())
        );
    }

    #[test]
    fn test_resolve_link_rejects_non_http() {
        let base = Url::parse("https://secure.runescape.com/m=news/archive").unwrap();

        assert_eq!(resolve_link(&base, "javascript:void(0)"), None);
        assert_eq!(resolve_link(&base, "mailto:a@b.c"), None);
    }

    #[test]
    fn test_article_requires_title() {
        let now = chrono::Utc::now();

        assert!(article(Site::Osrs, String::new(), Some("https://x/a".into()), Some(now)).is_none());
        assert!(article(Site::Osrs, "T".into(), None, Some(now)).is_none());
        assert!(article(Site::Osrs, "T".into(), Some("https://x/a".into()), None).is_none());
        assert!(article(Site::Osrs, "T".into(), Some("https://x/a".into()), Some(now)).is_some());
    }
}
