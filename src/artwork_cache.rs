//! Process-lifetime map from key to resolved artwork.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::artwork_key::ArtworkKey;
use crate::protocol::{CacheEntry, ImageReference, Provenance};

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Write-once cache: an entry never changes after insertion, only [`ArtworkCache::clear`]
/// removes it.
#[derive(Debug, Default)]
pub struct ArtworkCache {
    entries: HashMap<ArtworkKey, CacheEntry>,
}

impl ArtworkCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ArtworkKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &ArtworkKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores the first result for `key` and returns the entry now cached.
    pub fn insert_once(
        &mut self,
        key: ArtworkKey,
        image: ImageReference,
        provenance: Provenance,
    ) -> CacheEntry {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry {
                key,
                image,
                provenance,
                resolved_at_unix_ms: now_unix_ms(),
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry and returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::ArtworkCache;
    use crate::artwork_key::canonicalize;
    use crate::protocol::{ImageReference, Provenance};

    #[test]
    fn test_insert_once_keeps_first_entry() {
        let mut cache = ArtworkCache::new();
        let key = canonicalize("Sample Artist", "Sample Song");
        let first = cache.insert_once(
            key.clone(),
            ImageReference::new("https://img.example/a.jpg"),
            Provenance::Exact,
        );
        let second = cache.insert_once(
            key.clone(),
            ImageReference::new("data:image/svg+xml;base64,AAAA"),
            Provenance::Fallback,
        );
        assert_eq!(first, second);
        assert_eq!(cache.get(&key).map(|entry| entry.provenance), Some(Provenance::Exact));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_reports_dropped_entries() {
        let mut cache = ArtworkCache::new();
        for index in 0..3 {
            cache.insert_once(
                canonicalize("Artist", &format!("Song {index}")),
                ImageReference::new("https://img.example/a.jpg"),
                Provenance::Exact,
            );
        }
        assert_eq!(cache.clear(), 3);
        assert!(cache.is_empty());
        assert!(!cache.contains(&canonicalize("Artist", "Song 0")));
    }
}
