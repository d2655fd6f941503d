//! Value types shared between the engine and its consumers.

use crate::artwork_key::ArtworkKey;

/// Priority class of one resolution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriorityTier {
    Low,
    Normal,
    High,
}

impl PriorityTier {
    /// Admission rank; lower ranks are admitted first.
    pub fn admission_rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// Where a cached image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Returned by the external search.
    Exact,
    /// Synthesized placeholder after a miss or a failed lookup.
    Fallback,
}

/// Opaque displayable image handle: an `http(s)` URL or an embedded `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with("https://") || self.0.starts_with("http://")
    }

    pub fn is_embedded(&self) -> bool {
        self.0.starts_with("data:")
    }
}

/// Immutable record written once per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: ArtworkKey,
    pub image: ImageReference,
    pub provenance: Provenance,
    pub resolved_at_unix_ms: i64,
}

/// One item of a caller's ordered list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkItem {
    pub id: String,
    pub artist: String,
    pub track: String,
}

impl ArtworkItem {
    pub fn new(id: impl Into<String>, artist: impl Into<String>, track: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            artist: artist.into(),
            track: track.into(),
        }
    }
}

/// Change notifications published as results land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkEvent {
    Resolved { key: ArtworkKey, entry: CacheEntry },
    CacheCleared { dropped_entries: usize },
}

/// One parsed search result. Transient: produced per lookup and dropped after scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCandidate {
    pub artist: String,
    pub track: String,
    pub artwork: Option<ImageReference>,
}

impl SearchCandidate {
    pub fn has_artwork(&self) -> bool {
        self.artwork.is_some()
    }
}
