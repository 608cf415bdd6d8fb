//! Info-hash extraction from magnet URIs found in scraped pages.
//!
//! Sites change how they embed magnets every now and then, so extraction is an
//! ordered list of strategies. The first one that yields a hash wins.

use regex_lite::Regex;
use tracing::warn;

/// A recovered info hash plus the magnet URI to hand out for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Uppercase info hash.
    pub info_hash: String,
    /// Magnet URI, either the original or one rebuilt around the hash.
    pub magnet_url: String,
}

/// One way of pulling an info hash out of a magnet string.
pub trait InfoHashStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Try to extract. `title` is available for strategies that rebuild the magnet.
    fn extract(&self, magnet: &str, title: &str) -> Option<Extracted>;
}

/// Canonicalize a raw hash: drop separators, uppercase, reject anything that
/// isn't hexadecimal.
pub(crate) fn canonical_hash(raw: &str) -> Option<String> {
    let hash: String = raw.chars().filter(|c| *c != '-').collect();
    if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_uppercase())
}

/// Plain `btih:<hash>&` form. The magnet is used verbatim.
pub struct PlainBtih {
    pattern: Regex,
}

impl PlainBtih {
    pub fn new() -> Self {
        Self {
            // Non-greedy: stop at the first parameter separator.
            pattern: Regex::new(r"btih:(.+?)&").expect("static regex"),
        }
    }
}

impl Default for PlainBtih {
    fn default() -> Self {
        Self::new()
    }
}

impl InfoHashStrategy for PlainBtih {
    fn name(&self) -> &'static str {
        "plain_btih"
    }

    fn extract(&self, magnet: &str, _title: &str) -> Option<Extracted> {
        let raw = self.pattern.captures(magnet)?.get(1)?.as_str();
        let info_hash = canonical_hash(raw)?;
        Some(Extracted {
            info_hash,
            magnet_url: magnet.to_string(),
        })
    }
}

/// JS-escaped form: `btih:<hash>\x26dn=...\x26tr=...`, hash possibly split by dashes.
///
/// The rest of such a magnet is only partially escaped, so it gets rebuilt from
/// the hash, the page title and the tracker tail.
pub struct EscapedBtih {
    pattern: Regex,
}

const ESCAPED_AMP: &str = r"\x26";
const ESCAPED_TRACKER_TAIL: &str = r"\x26tr=";

impl EscapedBtih {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"btih:(.+?)\\x26dn=").expect("static regex"),
        }
    }
}

impl Default for EscapedBtih {
    fn default() -> Self {
        Self::new()
    }
}

impl InfoHashStrategy for EscapedBtih {
    fn name(&self) -> &'static str {
        "escaped_btih"
    }

    fn extract(&self, magnet: &str, title: &str) -> Option<Extracted> {
        let raw = self.pattern.captures(magnet)?.get(1)?.as_str();
        let info_hash = canonical_hash(raw)?;

        let Some(tail_index) = magnet.find(ESCAPED_TRACKER_TAIL) else {
            warn!(
                magnet = magnet,
                "Couldn't recreate magnet URL by cutting at \\x26tr=. Did the HTML change?"
            );
            return None;
        };
        let tail = magnet[tail_index..].replace(ESCAPED_AMP, "&");

        let magnet_url = format!(
            "magnet:?xt=urn:btih:{}&dn={}{}",
            info_hash,
            urlencoding::encode(title),
            tail
        );
        Some(Extracted {
            info_hash,
            magnet_url,
        })
    }
}

/// The default strategy order.
pub fn default_strategies() -> Vec<Box<dyn InfoHashStrategy>> {
    vec![Box::new(PlainBtih::new()), Box::new(EscapedBtih::new())]
}

/// Apply strategies in order, stopping at the first success.
pub fn extract_info_hash(
    strategies: &[Box<dyn InfoHashStrategy>],
    magnet: &str,
    title: &str,
) -> Option<Extracted> {
    strategies
        .iter()
        .find_map(|strategy| strategy.extract(magnet, title))
}
