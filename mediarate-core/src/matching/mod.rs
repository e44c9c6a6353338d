//! Candidate scoring. The general rule blends fuzzy title similarity, year
//! distance and an imdb id bonus; douban tv listings go through an
//! exact season-aware gate instead.

mod numerals;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use rapidfuzz::distance::indel;

use crate::model::{CanonicalMedia, MatchScore, MediaType, SearchCandidate};
use crate::platform::Platform;

pub use numerals::parse_ideographic;

const TITLE_WEIGHT: f64 = 0.6;
const YEAR_EXACT: u32 = 30;
const YEAR_ADJACENT: u32 = 15;
const IMDB_BONUS: u32 = 10;
const SEASON_PREFIX: u32 = 60;
const SEASON_YEAR: u32 = 30;

fn season_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"^(.*?)\s*第\s*([^\s季]+)\s*季").expect("valid regex"))
}

fn trailing_year() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"^(.*?)\s*[(（]\s*(\d{4})\s*[)）]\s*$").expect("valid regex"))
}

/// Fuzzy ratio on a 0..=100 scale, case-insensitive.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    indel::normalized_similarity(a.chars(), b.chars()) * 100.0
}

/// Splits `"Title (2010)"` into its title and year parts.
pub fn split_title_year(raw: &str) -> (String, Option<String>) {
    let raw = raw.trim();
    match trailing_year().captures(raw) {
        Some(caps) => (caps[1].trim().to_string(), Some(caps[2].to_string())),
        None => (raw.to_string(), None),
    }
}

fn year_points(expected: &str, actual: &str) -> u32 {
    let (Ok(expected), Ok(actual)) = (expected.trim().parse::<i32>(), actual.trim().parse::<i32>())
    else {
        return 0;
    };
    match (expected - actual).abs() {
        0 => YEAR_EXACT,
        1 => YEAR_ADJACENT,
        _ => 0,
    }
}

fn imdb_points(media: &CanonicalMedia, candidate: &SearchCandidate) -> u32 {
    match (media.imdb_id.as_deref(), candidate.imdb_id.as_deref()) {
        (Some(expected), Some(actual))
            if !expected.trim().is_empty() && expected.trim().eq_ignore_ascii_case(actual.trim()) =>
        {
            IMDB_BONUS
        }
        _ => 0,
    }
}

/// Score in `0..=100` for one candidate.
pub fn score(media: &CanonicalMedia, candidate: &SearchCandidate, platform: Platform) -> u8 {
    if platform == Platform::Douban && media.media_type == MediaType::Tv {
        return score_douban_season(media, candidate);
    }
    let similarity = media
        .title_variants(platform == Platform::Douban)
        .into_iter()
        .map(|variant| title_similarity(variant, &candidate.title))
        .fold(0.0_f64, f64::max);
    let title = (similarity * TITLE_WEIGHT).round() as u32;
    let total = title + year_points(&media.year, &candidate.year) + imdb_points(media, candidate);
    total.min(100) as u8
}

/// Douban tv rule: the title before the season marker must equal the
/// localized title, and the (season, year) pair must match a known season
/// exactly. Anything else scores 0. A listing without a marker is season 1.
pub fn score_douban_season(media: &CanonicalMedia, candidate: &SearchCandidate) -> u8 {
    let Some((prefix, season_number)) = douban_season_parts(&candidate.title) else {
        return 0;
    };
    let season_number = candidate.season_number.unwrap_or(season_number);
    let expected_title = if media.localized_title.trim().is_empty() {
        media.title.trim()
    } else {
        media.localized_title.trim()
    };
    if expected_title.is_empty() || prefix != expected_title {
        return 0;
    }
    let Some(season) = media.season(season_number) else {
        return 0;
    };
    if season.air_year.trim().is_empty() || season.air_year.trim() != candidate.year.trim() {
        return 0;
    }
    (SEASON_PREFIX + SEASON_YEAR + imdb_points(media, candidate)).min(100) as u8
}

/// Title prefix and season ordinal. `None` when a marker is present but its
/// ordinal cannot be parsed.
fn douban_season_parts(title: &str) -> Option<(String, u32)> {
    let (title, _) = split_title_year(title);
    match season_marker().captures(&title) {
        Some(caps) => {
            let ordinal = parse_ideographic(&caps[2])?;
            Some((caps[1].trim().to_string(), ordinal))
        }
        None => Some((title.trim().to_string(), 1)),
    }
}

/// Highest-scoring candidate clearing `threshold`. Ties keep the first seen.
pub fn best_match(
    media: &CanonicalMedia,
    candidates: &[SearchCandidate],
    platform: Platform,
    threshold: u8,
) -> Option<MatchScore> {
    let mut best: Option<MatchScore> = None;
    for candidate in candidates {
        let value = score(media, candidate, platform);
        if value < threshold {
            continue;
        }
        if best.as_ref().map_or(true, |current| value > current.score) {
            best = Some(MatchScore {
                score: value,
                candidate: candidate.clone(),
            });
        }
    }
    best
}

/// One accepted douban listing per season, ordered by season number.
/// Duplicate listings for a season keep the first seen.
pub fn douban_season_matches(
    media: &CanonicalMedia,
    candidates: &[SearchCandidate],
) -> Vec<(u32, MatchScore)> {
    let mut accepted: BTreeMap<u32, MatchScore> = BTreeMap::new();
    for candidate in candidates {
        let value = score_douban_season(media, candidate);
        if value == 0 {
            continue;
        }
        let Some((_, parsed)) = douban_season_parts(&candidate.title) else {
            continue;
        };
        let season_number = candidate.season_number.unwrap_or(parsed);
        accepted.entry(season_number).or_insert_with(|| MatchScore {
            score: value,
            candidate: candidate.clone(),
        });
    }
    accepted.into_iter().collect()
}
