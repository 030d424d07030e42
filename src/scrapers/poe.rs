//! Path of Exile forum announcements scraper.
//!
//! Each thread row carries a full post timestamp such as
//! `Jan 12, 2026, 4:30:00 PM`, so this source reports [`Granularity::Fine`].
//! The forum renders times in UTC for signed-out visitors.

use super::{ArticleSource, article, element_text, resolve_link, selector};
use crate::error::SourceError;
use crate::fetcher::{Fetch, HttpFetch, RetryFetch};
use crate::models::{Article, Granularity, Site};
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const LISTING_URL: &str = "https://www.pathofexile.com/forum/view-forum/news";
pub const PAGE_SIZE: usize = 20;

const CONTAINER: &str = "table.forumTable";
const ROW: &str = "tbody tr";
const TITLE_LINK: &str = ".thread_title .title a";
const POST_DATE: &str = ".post_date";

static POST_DATE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<mon>[A-Za-z]{3})[a-z]*\.?\s+(?P<day>\d{1,2}),\s*(?P<year>\d{4}),?\s+(?P<h>\d{1,2}):(?P<m>\d{2})(?::(?P<s>\d{2}))?\s*(?P<ampm>[AaPp][Mm])",
    )
    .expect("valid regex")
});

/// Scraper for the Path of Exile announcements forum.
#[derive(Debug)]
pub struct Poe<F = HttpFetch> {
    fetcher: RetryFetch<F>,
    listing_url: String,
    page_size: usize,
}

impl<F: Fetch> Poe<F> {
    pub fn new(fetcher: RetryFetch<F>, listing_url: String, page_size: usize) -> Self {
        Self {
            fetcher,
            listing_url,
            page_size,
        }
    }
}

impl<F: Fetch> ArticleSource for Poe<F> {
    fn site(&self) -> Site {
        Site::Poe
    }

    fn granularity(&self) -> Granularity {
        Granularity::Fine
    }

    fn page_size(&self) -> Option<usize> {
        Some(self.page_size)
    }

    #[instrument(level = "info", skip_all, fields(url = %self.listing_url))]
    async fn list(&self) -> Result<Vec<Article>, SourceError> {
        let Some(html) = self.fetcher.fetch(&self.listing_url).await else {
            warn!("PoE listing unavailable; no new data this run");
            return Ok(Vec::new());
        };
        let articles = parse_listing(&html, &self.listing_url)?;
        info!(count = articles.len(), "Parsed PoE announcements");
        Ok(articles)
    }
}

/// Parse the forum board into articles, in page order.
pub fn parse_listing(html: &str, page_url: &str) -> Result<Vec<Article>, SourceError> {
    let site = Site::Poe;
    let document = Html::parse_document(html);
    let table_sel = selector(site, CONTAINER)?;
    let row_sel = selector(site, ROW)?;
    let link_sel = selector(site, TITLE_LINK)?;
    let date_sel = selector(site, POST_DATE)?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or(SourceError::MissingContainer {
            site,
            selector: CONTAINER,
        })?;
    let base = Url::parse(page_url).ok();

    let articles = table
        .select(&row_sel)
        // Spacer and header rows have no thread link.
        .filter(|row| row.select(&link_sel).next().is_some())
        .filter_map(|row| {
            let link = row.select(&link_sel).next();
            let title = link.map(element_text).unwrap_or_default();
            let url = link
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| match &base {
                    Some(base) => resolve_link(base, href),
                    None => Url::parse(href).ok().map(String::from),
                });
            let published = row
                .select(&date_sel)
                .next()
                .and_then(|el| parse_post_date(&element_text(el)));
            article(site, title, url, published)
        })
        .collect::<Vec<_>>();

    debug!(count = articles.len(), "PoE entries");
    Ok(articles)
}

/// Parses forum timestamps like `Jan 12, 2026, 4:30:00 PM` or `Sept 3, 2025 9:05 am`.
fn parse_post_date(text: &str) -> Option<DateTime<Utc>> {
    let caps = POST_DATE_TEXT.captures(text)?;
    let normalised = format!(
        "{} {} {} {}:{}:{} {}",
        &caps["mon"],
        &caps["day"],
        &caps["year"],
        &caps["h"],
        &caps["m"],
        caps.name("s").map_or("00", |s| s.as_str()),
        caps["ampm"].to_uppercase(),
    );
    NaiveDateTime::parse_from_str(&normalised, "%b %d %Y %I:%M:%S %p")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = r#"
        <table class="forumTable viewForumTable">
          <thead><tr><th>Thread</th></tr></thead>
          <tbody>
            <tr>
              <td class="thread">
                <div class="thread_title"><div class="title">
                  <a href="/forum/view-thread/3900001">Path of Exile 3.28.0 Patch Notes</a>
                </div></div>
                <div class="postBy">
                  <span class="post_by_account"><a href="/account/view-profile/Community_Team">Community_Team</a></span>,
                  <span class="post_date">Jan 12, 2026, 4:30:00 PM</span>
                </div>
              </td>
            </tr>
            <tr class="spacer"><td></td></tr>
            <tr>
              <td class="thread">
                <div class="thread_title"><div class="title">
                  <a href="/forum/view-thread/3899990">Weekend Sale</a>
                </div></div>
                <div class="postBy"><span class="post_date">Jan 10, 2026, 9:05 am</span></div>
              </td>
            </tr>
          </tbody>
        </table>
    "#;

    #[test]
    fn test_parse_listing() {
        let articles = parse_listing(PAGE, LISTING_URL).unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Path of Exile 3.28.0 Patch Notes");
        assert_eq!(articles[0].url, "https://www.pathofexile.com/forum/view-thread/3900001");
        assert_eq!(
            articles[0].published,
            Utc.with_ymd_and_hms(2026, 1, 12, 16, 30, 0).unwrap()
        );
        assert_eq!(
            articles[1].published,
            Utc.with_ymd_and_hms(2026, 1, 10, 9, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_table_is_structural_error() {
        let err = parse_listing("<html><body>Cloudflare</body></html>", LISTING_URL).unwrap_err();

        assert!(matches!(err, SourceError::MissingContainer { site: Site::Poe, .. }));
    }

    #[test]
    fn test_parse_post_date_variants() {
        assert_eq!(
            parse_post_date("Sept 3, 2025 12:15 AM"),
            Some(Utc.with_ymd_and_hms(2025, 9, 3, 0, 15, 0).unwrap())
        );
        assert_eq!(
            parse_post_date(", Dec 31, 2025, 11:59:59 PM"),
            Some(Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap())
        );
        assert_eq!(parse_post_date("a while ago"), None);
    }
}
