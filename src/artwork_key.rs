//! Canonical cache/dedup keys for (artist, track) pairs.

use std::fmt;

const FIELD_SEPARATOR: &str = "::";

/// Canonical identifier of one (artist, track) pair.
///
/// Both fields are lower-cased with punctuation treated as whitespace and runs of whitespace
/// collapsed, so `"Taylor  Swift"`/`"ANTI-HERO!"` and `"taylor swift"`/`"anti hero"` give the
/// same key. The separator is made of punctuation and therefore can never
/// occur inside a normalized field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtworkKey(String);

impl ArtworkKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the key back into its normalized (artist, track) halves.
    pub fn parts(&self) -> (&str, &str) {
        self.0
            .split_once(FIELD_SEPARATOR)
            .unwrap_or((self.0.as_str(), ""))
    }

    /// True when both halves normalized to nothing.
    pub fn is_empty(&self) -> bool {
        self.0 == FIELD_SEPARATOR
    }
}

impl fmt::Display for ArtworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-cases one field, turns punctuation into word breaks and collapses whitespace.
///
/// Shared with match scoring so candidate comparison uses the same notion of equality as the
/// cache.
pub fn normalize_field(value: &str) -> String {
    let mut normalized = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            normalized.extend(ch.to_lowercase());
        } else {
            normalized.push(' ');
        }
    }
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn canonicalize(artist: &str, track: &str) -> ArtworkKey {
    ArtworkKey(format!(
        "{}{FIELD_SEPARATOR}{}",
        normalize_field(artist),
        normalize_field(track)
    ))
}

#[cfg(test)]
mod tests {
    use super::{canonicalize, normalize_field};

    #[test]
    fn test_normalize_field_collapses_case_whitespace_and_punctuation() {
        assert_eq!(normalize_field("  The   WEEKND "), "the weeknd");
        assert_eq!(normalize_field("AC/DC"), "ac dc");
        assert_eq!(normalize_field("Anti-Hero!"), "anti hero");
        assert_eq!(normalize_field("Don't -- Stop"), "don t stop");
        assert_eq!(normalize_field("Beyoncé"), "beyoncé");
    }

    #[test]
    fn test_canonicalize_maps_textual_variants_to_same_key() {
        assert_eq!(
            canonicalize("Taylor Swift", "Anti-Hero"),
            canonicalize("  taylor   SWIFT", "ANTI-HERO")
        );
        assert_eq!(
            canonicalize("Daft Punk", "One More Time"),
            canonicalize("daft\tpunk", "one  more  time")
        );
    }

    #[test]
    fn test_canonicalize_treats_punctuation_as_word_break() {
        assert_eq!(
            canonicalize("Taylor Swift", "Anti-Hero"),
            canonicalize("Taylor Swift", "Anti Hero")
        );
        assert_eq!(canonicalize("AC/DC", "T.N.T."), canonicalize("ac dc", "t n t"));
        assert_eq!(canonicalize("Taylor Swift", "Anti-Hero").as_str(), "taylor swift::anti hero");
    }

    #[test]
    fn test_canonicalize_keeps_field_boundaries() {
        assert_ne!(canonicalize("a b", "c"), canonicalize("a", "b c"));
        let key = canonicalize("Sample Artist", "Sample Song");
        assert_eq!(key.parts(), ("sample artist", "sample song"));
    }

    #[test]
    fn test_empty_key_detection() {
        assert!(canonicalize("  ", "!!").is_empty());
        assert!(!canonicalize("", "Song").is_empty());
    }
}
