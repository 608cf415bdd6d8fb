//! Testing utilities and mock implementations.
//!
//! This module provides a mock source and fixtures for building results and
//! upstream pages, allowing aggregator and source tests without real sites.
//!
//! # Example
//!
//! ```rust,ignore
//! use torrentfed_core::testing::{MockSource, fixtures};
//!
//! let fast = MockSource::new("fast")
//!     .with_results(vec![fixtures::torrent_result("Movie", "1080p", "AAAA")]);
//! let slow = MockSource::new("slow").with_delay(Duration::from_secs(5));
//!
//! // Hand them to an Aggregator...
//! ```

mod mock_source;

pub use mock_source::{MockSource, RecordedCheck};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::source::TorrentResult;

    /// Create a test result with a magnet carrying the same hash.
    pub fn torrent_result(title: &str, quality: &str, info_hash: &str) -> TorrentResult {
        TorrentResult {
            title: title.to_string(),
            quality: quality.to_string(),
            info_hash: info_hash.to_string(),
            magnet_url: format!(
                "magnet:?xt=urn:btih:{}&dn={}",
                info_hash,
                urlencoding::encode(title)
            ),
        }
    }

    /// A plain magnet for `release`, the way most detail pages embed it.
    pub fn magnet(info_hash: &str, release: &str) -> String {
        format!(
            "magnet:?xt=urn:btih:{}&dn={}&tr=udp%3A%2F%2Ftracker.example.org%3A1337",
            info_hash, release
        )
    }

    /// A JS-escaped magnet with a dash-split hash.
    pub fn escaped_magnet(dashed_hash: &str, release: &str) -> String {
        format!(
            r"magnet:?xt=urn:btih:{}\x26dn={}\x26tr=udp%3A%2F%2Ftracker.example.org%3A1337\x26tr=udp%3A%2F%2Fopen.example.com%3A80",
            dashed_hash, release
        )
    }

    /// A search results page listing the given detail-page links.
    pub fn ibit_search_page(hrefs: &[&str]) -> String {
        let rows: String = hrefs
            .iter()
            .enumerate()
            .map(|(i, href)| {
                format!(
                    "<tr><td class=\"name\"><a href=\"{}\">Result {}</a></td><td>1.4 GB</td></tr>\n",
                    href, i
                )
            })
            .collect();
        format!(
            "<html><body><div id=\"content\">\
             <table class=\"torrents\">\n<tr><th>Name</th><th>Size</th></tr>\n{}</table>\
             </div></body></html>",
            rows
        )
    }

    /// A torrent detail page whose script embeds `magnet`.
    pub fn ibit_torrent_page(title: &str, magnet: &str) -> String {
        format!(
            "<html><head><script type=\"text/javascript\">\
             var link = '{}';\
             </script></head><body>\
             <div id=\"extra-info\"><h2><a href=\"#\">{}</a></h2></div>\
             </body></html>",
            magnet, title
        )
    }
}
