//! Decimal "lat, lng" detection in free text.
//!
//! Synchronous and network-free, so it always runs before any other strategy.

use regex::Regex;
use std::sync::OnceLock;

use super::types::Coordinate;

/// Latitude in [-90, 90] and longitude in [-180, 180], comma separated.
///
/// The leading and trailing guards stop a pair from being carved out of a
/// longer number (`"5, 20100"` is not `5, 20`). A trailing dot is accepted
/// when no digit follows it, so a pair may end a sentence.
const PAIR_PATTERN: &str = concat!(
    r"(?:^|[^\d.])",
    r"([-+]?(?:90(?:\.0+)?|[1-8]?\d(?:\.\d+)?))",
    r"\s*,\s*",
    r"([-+]?(?:180(?:\.0+)?|(?:1[0-7]\d|[1-9]?\d)(?:\.\d+)?))",
    r"(?:\.(?:\D|$)|[^\d.]|$)",
);

fn pair_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(PAIR_PATTERN).expect("coordinate pattern is valid"))
}

/// Return the first decimal-degree pair found in `text`, if any.
pub fn extract(text: &str) -> Option<Coordinate> {
    let caps = pair_regex().captures(text)?;
    let coord = Coordinate::parse(caps.get(1)?.as_str(), caps.get(2)?.as_str());
    if coord.is_none() {
        tracing::debug!(text, "coordinate-like text did not parse");
    }
    coord
}
