//! HTML scraping for search-result and torrent-detail pages.
//!
//! Everything here is synchronous: `scraper::Html` must never be held across
//! an `.await`.

use regex_lite::Regex;
use scraper::{Html, Selector};
use tracing::warn;

use super::extract::{default_strategies, extract_info_hash, InfoHashStrategy};
use super::quality::classify_quality;
use super::TorrentResult;

/// Row selector on the search results page.
const RESULT_ROW_SELECTOR: &str = ".torrents tr";
/// Title selector on a torrent detail page.
const TITLE_SELECTOR: &str = "#extra-info h2 a";

/// Why a detail page didn't produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Transport error while fetching the page.
    Request,
    /// Non-200 response.
    BadStatus,
    /// No magnet literal in the page's script content.
    NoMagnet,
    /// No title element.
    NoTitle,
    /// None of the allowed resolutions in the magnet.
    UnsupportedQuality,
    /// Magnet found, but no strategy could recover the info hash.
    NoInfoHash,
    /// The link couldn't be routed through the configured base URL.
    BadLink,
}

impl SkipReason {
    /// Label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Request => "request",
            SkipReason::BadStatus => "bad_status",
            SkipReason::NoMagnet => "no_magnet",
            SkipReason::NoTitle => "no_title",
            SkipReason::UnsupportedQuality => "unsupported_quality",
            SkipReason::NoInfoHash => "no_info_hash",
            SkipReason::BadLink => "bad_link",
        }
    }
}

/// Result of processing one detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Keep(TorrentResult),
    Skip(SkipReason),
}

/// Torrent page links found on a search results page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchPageLinks {
    /// Raw `href` values, in page order.
    pub hrefs: Vec<String>,
    /// Result rows that had no usable link.
    pub rows_without_link: usize,
}

/// Collect detail-page links from a search results page.
pub fn parse_search_page(html: &str) -> SearchPageLinks {
    let document = Html::parse_document(html);
    let (Ok(row_selector), Ok(link_selector)) =
        (Selector::parse(RESULT_ROW_SELECTOR), Selector::parse("a"))
    else {
        return SearchPageLinks::default();
    };

    let mut links = SearchPageLinks::default();
    for row in document.select(&row_selector) {
        let href = row
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty());

        match href {
            Some(href) => links.hrefs.push(href.to_string()),
            None => links.rows_without_link += 1,
        }
    }
    links
}

/// Extract the title from a detail page.
pub fn parse_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(TITLE_SELECTOR).ok()?;
    let title: String = document.select(&selector).next()?.text().collect();
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Turns torrent detail pages into results.
///
/// Patterns are compiled once here and shared by every request of the owning
/// source.
pub struct PageScraper {
    magnet_pattern: Regex,
    strategies: Vec<Box<dyn InfoHashStrategy>>,
}

impl PageScraper {
    pub fn new() -> Self {
        Self::with_strategies(default_strategies())
    }

    pub fn with_strategies(strategies: Vec<Box<dyn InfoHashStrategy>>) -> Self {
        Self {
            // The magnet is a JS string literal, the DOM only gets it at runtime.
            magnet_pattern: Regex::new(r"'(magnet:\?[^']+)'").expect("static regex"),
            strategies,
        }
    }

    /// Find the magnet literal in a page body.
    pub fn find_magnet<'a>(&self, body: &'a str) -> Option<&'a str> {
        self.magnet_pattern
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Decide whether a detail page yields a result.
    pub fn process_page(&self, body: &str) -> PageOutcome {
        let Some(magnet) = self.find_magnet(body) else {
            return PageOutcome::Skip(SkipReason::NoMagnet);
        };

        let Some(title) = parse_title(body) else {
            return PageOutcome::Skip(SkipReason::NoTitle);
        };

        let Some(quality) = classify_quality(magnet) else {
            return PageOutcome::Skip(SkipReason::UnsupportedQuality);
        };

        let Some(extracted) = extract_info_hash(&self.strategies, magnet, &title) else {
            warn!(magnet = magnet, "Couldn't extract info_hash. Did the HTML change?");
            return PageOutcome::Skip(SkipReason::NoInfoHash);
        };

        PageOutcome::Keep(TorrentResult {
            title,
            quality,
            info_hash: extracted.info_hash,
            magnet_url: extracted.magnet_url,
        })
    }
}

impl Default for PageScraper {
    fn default() -> Self {
        Self::new()
    }
}
