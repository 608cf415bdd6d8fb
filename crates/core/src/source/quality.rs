//! Quality classification from release markers.

/// Suffix appended to cam releases.
///
/// See <https://en.wikipedia.org/wiki/Pirated_movie_release_types>.
pub const CAM_MARKER: &str = " (⚠️cam)";

/// Resolutions we hand out, in the order they are checked.
pub const ALLOWED_RESOLUTIONS: [&str; 3] = ["720p", "1080p", "2160p"];

/// Classify a magnet URI (or release name) by the markers it contains.
///
/// Returns `None` if none of the allowed resolutions is present, in which
/// case the candidate must be dropped.
pub fn classify_quality(magnet: &str) -> Option<String> {
    let mut quality = ALLOWED_RESOLUTIONS
        .iter()
        .find(|res| magnet.contains(*res))?
        .to_string();

    if magnet.contains("10bit") {
        quality.push_str(" 10bit");
    }

    if magnet.contains("HDCAM") {
        quality.push_str(CAM_MARKER);
    }

    Some(quality)
}

/// Normalize a resolution reported as a separate field (API sources).
pub fn resolution_from_field(value: &str, ten_bit: bool) -> Option<String> {
    let value = value.trim();
    let res = ALLOWED_RESOLUTIONS
        .iter()
        .find(|res| value.eq_ignore_ascii_case(res))?;
    let mut quality = res.to_string();
    if ten_bit {
        quality.push_str(" 10bit");
    }
    Some(quality)
}
