//! Episode number extraction from release filenames
//!
//! Release names are adversarial: episode numbers hide between group tags,
//! checksums, and quality markers. Extraction runs an ordered cascade of
//! matchers, first hit wins:
//! - "Show 2nd Season - 03.mkv" resolves from the digits before the extension
//! - "[Group] Show - 07 (1080p).mkv" resolves from the token after the hyphen
//! - "[Group] Show [04][720p].mkv" resolves from a short bracketed tag
//!
//! Numbers outside 1..=999 are never accepted; a name no matcher resolves
//! yields `None`, which callers must treat as "flag for manual review" rather
//! than defaulting to episode 0 or 1.

use once_cell::sync::Lazy;
use regex::Regex;

/// Smallest episode number a matcher may return.
pub const MIN_EPISODE_NUMBER: u32 = 1;
/// Largest episode number a matcher may return.
pub const MAX_EPISODE_NUMBER: u32 = 999;

/// The cascade, in priority order. Each matcher is pure and independently
/// testable; `extract_episode_number` walks the list.
const MATCHERS: [fn(&str) -> Option<u32>; 4] = [
    match_trailing_digits,
    match_after_hyphen,
    match_bracket_tag,
    match_first_standalone,
];

static TRAILING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)(?:\.\w+)?$").unwrap());
static BRACKET_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]").unwrap());
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static STANDALONE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([1-9]\d{0,2})\b").unwrap());

/// Extract an episode number from a release filename.
///
/// Total over arbitrary input: returns a number in
/// [`MIN_EPISODE_NUMBER`, `MAX_EPISODE_NUMBER`] or `None`, never panics.
pub fn extract_episode_number(filename: &str) -> Option<u32> {
    MATCHERS.iter().find_map(|matcher| matcher(filename))
}

fn in_bounds(n: u32) -> bool {
    (MIN_EPISODE_NUMBER..=MAX_EPISODE_NUMBER).contains(&n)
}

/// Matcher 1: digits immediately preceding the file extension (or the end of
/// the name when there is no extension).
fn match_trailing_digits(filename: &str) -> Option<u32> {
    let caps = TRAILING_DIGITS.captures(filename)?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    in_bounds(n).then_some(n)
}

/// Matcher 2: digits starting the token right after a standalone `-` token.
/// A hyphen directly preceded by a "Season" token is a season marker
/// ("Show Season - 6 [1080p]"), not an episode marker, and is skipped.
fn match_after_hyphen(filename: &str) -> Option<u32> {
    let tokens: Vec<&str> = filename.split_whitespace().collect();
    for (idx, token) in tokens.iter().enumerate() {
        if *token != "-" {
            continue;
        }
        if idx > 0 && tokens[idx - 1].eq_ignore_ascii_case("season") {
            continue;
        }
        let Some(next) = tokens.get(idx + 1) else {
            continue;
        };
        let digits: String = next.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            continue;
        }
        if let Ok(n) = digits.parse::<u32>() {
            if in_bounds(n) {
                return Some(n);
            }
        }
    }
    None
}

/// Matcher 3: digits inside a short `[..]` tag, scanned from the last bracket
/// backward. Resolution and quality tags tend to trail the episode tag;
/// the narrower 1..=99 bound rejects them.
fn match_bracket_tag(filename: &str) -> Option<u32> {
    let groups: Vec<&str> = BRACKET_GROUP
        .captures_iter(filename)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    for content in groups.iter().rev() {
        if content.chars().count() > 4 {
            continue;
        }
        let Some(m) = DIGIT_RUN.find(content) else {
            continue;
        };
        if let Ok(n) = m.as_str().parse::<u32>() {
            if (1..=99).contains(&n) {
                return Some(n);
            }
        }
    }
    None
}

/// Matcher 4, last resort: the first standalone 1-3 digit token anywhere.
fn match_first_standalone(filename: &str) -> Option<u32> {
    let caps = STANDALONE_NUMBER.captures(filename)?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    in_bounds(n).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_digits_before_extension() {
        assert_eq!(match_trailing_digits("Frieren 2nd Season - 03.mkv"), Some(3));
        assert_eq!(match_trailing_digits("Show.S02.E14.mp4"), Some(14));
        assert_eq!(match_trailing_digits("Show - 07 (1080p).mkv"), None);
        // four-digit years are out of bounds, not episodes
        assert_eq!(match_trailing_digits("Show 2019.mkv"), None);
        assert_eq!(match_trailing_digits("Show (2019).mkv"), None);
    }

    #[test]
    fn hyphen_token_matcher() {
        assert_eq!(match_after_hyphen("[Group] Show - 07 (1080p).mkv"), Some(7));
        assert_eq!(match_after_hyphen("Show - 12v2 [720p].mkv"), Some(12));
        assert_eq!(match_after_hyphen("Show-07.mkv"), None);
        assert_eq!(match_after_hyphen("Show - finale.mkv"), None);
    }

    #[test]
    fn hyphen_skips_season_marker() {
        assert_eq!(match_after_hyphen("Show Season - 6 [1080p].mkv"), None);
        // a later episode hyphen still matches
        assert_eq!(
            match_after_hyphen("Show Season - 6 - 11 [1080p].mkv"),
            Some(11)
        );
    }

    #[test]
    fn bracket_tag_scans_backward() {
        assert_eq!(match_bracket_tag("[SubsPlease] Show [04] [720p].mkv"), Some(4));
        assert_eq!(match_bracket_tag("[Judas] Show [04][1080p].mkv"), Some(4));
        assert_eq!(match_bracket_tag("[SubsPlease] Show [1080p].mkv"), None);
        assert_eq!(match_bracket_tag("Show without brackets 04.mkv"), None);
    }

    #[test]
    fn first_standalone_last_resort() {
        assert_eq!(match_first_standalone("Show ep 9 final.mkv"), Some(9));
        assert_eq!(match_first_standalone("Show.mkv"), None);
    }

    #[test]
    fn cascade_order_first_match_wins() {
        // matcher 1 beats the bracket tag
        assert_eq!(
            extract_episode_number("[Group] Show [99] - 03.mkv"),
            Some(3)
        );
        // matcher 2 beats matcher 4's leading token
        assert_eq!(
            extract_episode_number("86 Eighty Six - 07 (1080p).mkv"),
            Some(7)
        );
    }

    #[test]
    fn unresolvable_names_yield_none() {
        assert_eq!(extract_episode_number(""), None);
        assert_eq!(extract_episode_number("Movie.Title.REMUX.mkv"), None);
        assert_eq!(extract_episode_number("no numbers here"), None);
    }

    #[test]
    fn never_out_of_bounds() {
        for name in [
            "Show 0.mkv",
            "Show - 0 [1080p].mkv",
            "Show 1000.mkv",
            "Show - 4096.mkv",
            "[ABCD1234] Show.mkv",
        ] {
            if let Some(n) = extract_episode_number(name) {
                assert!(
                    (MIN_EPISODE_NUMBER..=MAX_EPISODE_NUMBER).contains(&n),
                    "{} produced out-of-bounds {}",
                    name,
                    n
                );
            }
        }
    }
}
