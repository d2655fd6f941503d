//! Deterministic placeholder artwork for keys without a usable external image.
//!
//! The placeholder is a small SVG document (two-stop gradient plus the artist/track text)
//! embedded as a base64 `data:` URI. Output depends only on the key.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::artwork_key::ArtworkKey;
use crate::protocol::ImageReference;

const TILE_EDGE_PX: u32 = 600;
const MAX_LABEL_CHARS: usize = 28;
const SECOND_STOP_HUE_SHIFT: u32 = 40;

/// Colors derived from a key hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub hue: u32,
    pub saturation: u32,
    pub lightness: u32,
}

impl Palette {
    pub fn for_key(key: &ArtworkKey) -> Self {
        let hash = hash_string(key.as_str());
        Self {
            hue: hash % 360,
            saturation: 45 + (hash >> 9) % 30,
            lightness: 30 + (hash >> 17) % 20,
        }
    }

    fn second_stop(self) -> Self {
        Self {
            hue: (self.hue + SECOND_STOP_HUE_SHIFT) % 360,
            saturation: self.saturation,
            lightness: (self.lightness + 15).min(85),
        }
    }

    fn css(self) -> String {
        format!("hsl({}, {}%, {}%)", self.hue, self.saturation, self.lightness)
    }
}

/// 32-bit shift-and-subtract string hash (`h = h * 31 + c`, wrapping).
pub fn hash_string(value: &str) -> u32 {
    value
        .chars()
        .fold(0u32, |hash, ch| hash.wrapping_mul(31).wrapping_add(ch as u32))
}

fn truncate_label(value: &str) -> String {
    if value.chars().count() <= MAX_LABEL_CHARS {
        return value.to_string();
    }
    let mut out: String = value.chars().take(MAX_LABEL_CHARS - 1).collect();
    out.push('…');
    out
}

/// Renders the placeholder SVG document for `key`.
///
/// Key halves only contain alphanumerics and single spaces, so they are safe as SVG text.
pub fn render_svg(key: &ArtworkKey) -> String {
    let (artist, track) = key.parts();
    let start = Palette::for_key(key);
    let end = start.second_stop();
    let edge = TILE_EDGE_PX;
    let center = edge / 2;
    format!(
        concat!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{edge}\" height=\"{edge}\" ",
            "viewBox=\"0 0 {edge} {edge}\">",
            "<defs><linearGradient id=\"g\" x1=\"0\" y1=\"0\" x2=\"1\" y2=\"1\">",
            "<stop offset=\"0%\" stop-color=\"{start}\"/>",
            "<stop offset=\"100%\" stop-color=\"{end}\"/>",
            "</linearGradient></defs>",
            "<rect width=\"{edge}\" height=\"{edge}\" fill=\"url(#g)\"/>",
            "<text x=\"{center}\" y=\"{track_y}\" text-anchor=\"middle\" ",
            "font-family=\"sans-serif\" font-size=\"36\" font-weight=\"bold\" ",
            "fill=\"#ffffff\">{track}</text>",
            "<text x=\"{center}\" y=\"{artist_y}\" text-anchor=\"middle\" ",
            "font-family=\"sans-serif\" font-size=\"26\" fill=\"#ffffff\" ",
            "fill-opacity=\"0.8\">{artist}</text>",
            "</svg>"
        ),
        edge = edge,
        center = center,
        track_y = center - 10,
        artist_y = center + 34,
        start = start.css(),
        end = end.css(),
        track = truncate_label(track),
        artist = truncate_label(artist),
    )
}

/// Produces the placeholder image reference for `key`.
pub fn synthesize(key: &ArtworkKey) -> ImageReference {
    let svg = render_svg(key);
    ImageReference::new(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(svg.as_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{hash_string, render_svg, synthesize, truncate_label, Palette, MAX_LABEL_CHARS};
    use crate::artwork_key::canonicalize;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    #[test]
    fn test_hash_string_is_deterministic() {
        assert_eq!(hash_string("abc"), hash_string("abc"));
        assert_ne!(hash_string("abc"), hash_string("abd"));
        assert_eq!(hash_string(""), 0);
    }

    #[test]
    fn test_synthesize_is_byte_identical_for_same_key() {
        let first = synthesize(&canonicalize("Sample Artist", "Sample Song"));
        let second = synthesize(&canonicalize("sample  artist", "SAMPLE SONG"));
        assert_eq!(first.as_str().as_bytes(), second.as_str().as_bytes());
        assert!(first.is_embedded());
    }

    #[test]
    fn test_distinct_keys_produce_distinct_hues() {
        let pairs = [
            ("Taylor Swift", "Anti-Hero"),
            ("Daft Punk", "One More Time"),
            ("Radiohead", "Reckoner"),
            ("Björk", "Hyperballad"),
            ("Massive Attack", "Teardrop"),
            ("Portishead", "Roads"),
        ];
        let hues: HashSet<u32> = pairs
            .iter()
            .map(|(artist, track)| Palette::for_key(&canonicalize(artist, track)).hue)
            .collect();
        assert_eq!(hues.len(), pairs.len());
    }

    #[test]
    fn test_palette_stays_in_range() {
        for index in 0..200 {
            let palette = Palette::for_key(&canonicalize(&format!("artist {index}"), "track"));
            assert!(palette.hue < 360);
            assert!((45..75).contains(&palette.saturation));
            assert!((30..50).contains(&palette.lightness));
        }
    }

    #[test]
    fn test_svg_embeds_normalized_text_and_decodes() {
        let key = canonicalize("Simon & Garfunkel", "The Boxer");
        let svg = render_svg(&key);
        assert!(svg.contains("simon garfunkel"));
        assert!(svg.contains("the boxer"));

        let reference = synthesize(&key);
        let payload = reference
            .as_str()
            .strip_prefix("data:image/svg+xml;base64,")
            .expect("svg data uri prefix");
        let decoded = STANDARD.decode(payload).expect("valid base64");
        assert_eq!(String::from_utf8(decoded).expect("utf8 svg"), svg);
    }

    #[test]
    fn test_truncate_label_bounds_length() {
        let long = "x".repeat(100);
        let truncated = truncate_label(&long);
        assert_eq!(truncated.chars().count(), MAX_LABEL_CHARS);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate_label("short"), "short");
    }
}
