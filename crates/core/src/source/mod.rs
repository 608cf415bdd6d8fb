//! Torrent sources.
//!
//! This module provides the `Source` trait every upstream implements, the
//! rate-limited ibit scraper and the YTS API client.

pub mod extract;
mod ibit;
pub mod quality;
pub mod scrape;
mod types;
mod yts;

pub use ibit::{IbitSource, IBIT_SOURCE_NAME};
pub use types::*;
pub use yts::{YtsSource, YTS_SOURCE_NAME};

use reqwest::Url;

/// Route a URL found in scraped content through the configured base URL.
///
/// Only scheme and host (with port) are replaced. Path and query are kept, so
/// a proxy base URL like `http://proxy:8080/ibit` works too.
pub fn replace_base_url(orig: &str, new_base: &str) -> Result<String, SourceError> {
    let url = Url::parse(orig)
        .map_err(|e| SourceError::Parse(format!("Couldn't parse URL {}: {}", orig, e)))?;

    let mut replaced = new_base.trim_end_matches('/').to_string();
    replaced.push_str(url.path());
    if let Some(query) = url.query() {
        replaced.push('?');
        replaced.push_str(query);
    }
    Ok(replaced)
}

/// Turn an `href` from a scraped page into a URL under `base`.
pub fn resolve_link(href: &str, base: &str) -> Result<String, SourceError> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return replace_base_url(href, base);
    }

    let base = base.trim_end_matches('/');
    if href.starts_with('/') {
        Ok(format!("{}{}", base, href))
    } else {
        Ok(format!("{}/{}", base, href))
    }
}
