//! Old School RuneScape news archive scraper.
//!
//! The archive lists articles newest first with a day-precision date and no
//! time of day, so this source reports [`Granularity::Coarse`].
//!
//! # Markup
//!
//! ```html
//! <div class="news-list-container">
//!   <article class="news-list-article">
//!     <h3 class="news-list-article__title">
//!       <a class="news-list-article__title-link" href="...">Title</a>
//!     </h3>
//!     <time class="news-list-article__date" datetime="2026-01-10">10 January 2026</time>
//!   </article>
//! </div>
//! ```

use super::{ArticleSource, article, element_text, resolve_link, selector};
use crate::error::SourceError;
use crate::fetcher::{Fetch, HttpFetch, RetryFetch};
use crate::models::{Article, Granularity, Site};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const LISTING_URL: &str = "https://secure.runescape.com/m=news/archive?oldschool=1";
pub const PAGE_SIZE: usize = 10;

const CONTAINER: &str = ".news-list-container";
const ENTRY: &str = "article.news-list-article";
const TITLE_LINK: &str = ".news-list-article__title-link";
const DATE: &str = "time.news-list-article__date";

static DAY_MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s+([A-Za-z]+)\s+(\d{4})").expect("valid regex"));

/// Scraper for the Old School RuneScape news archive.
#[derive(Debug)]
pub struct Osrs<F = HttpFetch> {
    fetcher: RetryFetch<F>,
    listing_url: String,
    page_size: usize,
}

impl<F: Fetch> Osrs<F> {
    pub fn new(fetcher: RetryFetch<F>, listing_url: String, page_size: usize) -> Self {
        Self {
            fetcher,
            listing_url,
            page_size,
        }
    }
}

impl<F: Fetch> ArticleSource for Osrs<F> {
    fn site(&self) -> Site {
        Site::Osrs
    }

    fn granularity(&self) -> Granularity {
        Granularity::Coarse
    }

    fn page_size(&self) -> Option<usize> {
        Some(self.page_size)
    }

    #[instrument(level = "info", skip_all, fields(url = %self.listing_url))]
    async fn list(&self) -> Result<Vec<Article>, SourceError> {
        let Some(html) = self.fetcher.fetch(&self.listing_url).await else {
            warn!("OSRS listing unavailable; no new data this run");
            return Ok(Vec::new());
        };
        let articles = parse_listing(&html, &self.listing_url)?;
        info!(count = articles.len(), "Parsed OSRS news listing");
        Ok(articles)
    }
}

/// Parse the archive page into articles, in page order.
pub fn parse_listing(html: &str, page_url: &str) -> Result<Vec<Article>, SourceError> {
    let site = Site::Osrs;
    let document = Html::parse_document(html);
    let container_sel = selector(site, CONTAINER)?;
    let entry_sel = selector(site, ENTRY)?;
    let link_sel = selector(site, TITLE_LINK)?;
    let date_sel = selector(site, DATE)?;

    let container = document
        .select(&container_sel)
        .next()
        .ok_or(SourceError::MissingContainer {
            site,
            selector: CONTAINER,
        })?;
    let base = Url::parse(page_url).ok();

    let articles = container
        .select(&entry_sel)
        .filter_map(|entry| {
            let link = entry.select(&link_sel).next();
            let title = link.map(element_text).unwrap_or_default();
            let url = link
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| match &base {
                    Some(base) => resolve_link(base, href),
                    None => Url::parse(href).ok().map(String::from),
                });
            let published = entry.select(&date_sel).next().and_then(|time| {
                time.value()
                    .attr("datetime")
                    .and_then(parse_iso_date)
                    .or_else(|| parse_display_date(&element_text(time)))
            });
            article(site, title, url, published)
        })
        .collect::<Vec<_>>();

    debug!(count = articles.len(), "OSRS entries");
    Ok(articles)
}

fn parse_iso_date(raw: &str) -> Option<DateTime<Utc>> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok().map(midnight_utc)
}

/// Parses the visible date text, e.g. `10 January 2026`.
fn parse_display_date(text: &str) -> Option<DateTime<Utc>> {
    let caps = DAY_MONTH_YEAR.captures(text)?;
    let normalised = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
    NaiveDate::parse_from_str(&normalised, "%d %B %Y")
        .or_else(|_| NaiveDate::parse_from_str(&normalised, "%d %b %Y"))
        .ok()
        .map(midnight_utc)
}

fn midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}
