//! Deduplication of merged results by info_hash.

use std::collections::HashSet;

use crate::source::TorrentResult;

/// Drop results whose info_hash was already seen.
///
/// The first occurrence wins and the relative order of the kept results is
/// unchanged.
pub fn dedup_by_info_hash(results: Vec<TorrentResult>) -> Vec<TorrentResult> {
    let mut seen = HashSet::with_capacity(results.len());
    results
        .into_iter()
        .filter(|result| seen.insert(result.info_hash.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_dedup_first_wins() {
        let results = vec![
            fixtures::torrent_result("From YTS", "1080p", "AAAA"),
            fixtures::torrent_result("Other", "720p", "BBBB"),
            fixtures::torrent_result("From ibit", "1080p 10bit", "AAAA"),
        ];

        let deduped = dedup_by_info_hash(results);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "From YTS");
        assert_eq!(deduped[1].title, "Other");
    }

    #[test]
    fn test_dedup_preserves_order() {
        let results = vec![
            fixtures::torrent_result("C", "720p", "CCCC"),
            fixtures::torrent_result("A", "720p", "AAAA"),
            fixtures::torrent_result("C again", "720p", "CCCC"),
            fixtures::torrent_result("B", "720p", "BBBB"),
        ];

        let hashes: Vec<_> = dedup_by_info_hash(results)
            .into_iter()
            .map(|r| r.info_hash)
            .collect();
        assert_eq!(hashes, vec!["CCCC", "AAAA", "BBBB"]);
    }

    #[test]
    fn test_dedup_empty() {
        assert!(dedup_by_info_hash(vec![]).is_empty());
    }
}
