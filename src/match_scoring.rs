//! Ranks search candidates against the requested (artist, track) pair.

use crate::artwork_key::normalize_field;
use crate::protocol::SearchCandidate;

pub const DEFAULT_MIN_MATCH_SCORE: i32 = 10;

const ARTIST_EXACT_BONUS: i32 = 20;
const ARTIST_PARTIAL_BONUS: i32 = 10;
const TRACK_EXACT_BONUS: i32 = 15;
const TRACK_PARTIAL_BONUS: i32 = 8;
const ARTWORK_PRESENT_BONUS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FieldMatch {
    None,
    Partial,
    Exact,
}

fn field_match(requested: &str, candidate: &str) -> FieldMatch {
    if requested.is_empty() || candidate.is_empty() {
        return FieldMatch::None;
    }
    if requested == candidate {
        FieldMatch::Exact
    } else if candidate.contains(requested) || requested.contains(candidate) {
        FieldMatch::Partial
    } else {
        FieldMatch::None
    }
}

/// Deterministic score of one candidate; higher is better.
pub fn score_candidate(candidate: &SearchCandidate, artist: &str, track: &str) -> i32 {
    let mut score = 0;
    match field_match(
        &normalize_field(artist),
        &normalize_field(&candidate.artist),
    ) {
        FieldMatch::Exact => score += ARTIST_EXACT_BONUS,
        FieldMatch::Partial => score += ARTIST_PARTIAL_BONUS,
        FieldMatch::None => {}
    }
    match field_match(&normalize_field(track), &normalize_field(&candidate.track)) {
        FieldMatch::Exact => score += TRACK_EXACT_BONUS,
        FieldMatch::Partial => score += TRACK_PARTIAL_BONUS,
        FieldMatch::None => {}
    }
    if candidate.has_artwork() {
        score += ARTWORK_PRESENT_BONUS;
    }
    score
}

/// Picks the highest-scoring candidate that clears `min_score` (strictly greater).
///
/// Ties keep the earliest candidate, which preserves the search service's own ranking.
pub fn best_match<'a>(
    candidates: &'a [SearchCandidate],
    artist: &str,
    track: &str,
    min_score: i32,
) -> Option<&'a SearchCandidate> {
    let mut best: Option<(&SearchCandidate, i32)> = None;
    for candidate in candidates {
        let score = score_candidate(candidate, artist, track);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((candidate, score));
        }
    }
    best.filter(|(_, score)| *score > min_score)
        .map(|(candidate, _)| candidate)
}
