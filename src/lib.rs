//! Artwork resolution for ordered lists of (artist, track) pairs.
//!
//! Lookups go through a throttled iTunes search, are deduplicated per canonical key and cached
//! for the life of the process. Anything that cannot be resolved gets a deterministic
//! placeholder image instead, so every request eventually produces a displayable result.

pub mod artwork_cache;
pub mod artwork_key;
pub mod artwork_preload;
pub mod config;
pub mod fallback_art;
pub mod itunes_search;
pub mod lookup_throttle;
pub mod match_scoring;
pub mod priority_scheduler;
pub mod protocol;
pub mod request_coordinator;
pub mod resolution_engine;

pub use artwork_key::{canonicalize, ArtworkKey};
pub use config::{ArtworkConfig, FocusWindow};
pub use protocol::{
    ArtworkEvent, ArtworkItem, CacheEntry, ImageReference, PriorityTier, Provenance,
};
pub use request_coordinator::ResolutionTicket;
pub use resolution_engine::{FocusPassSummary, Resolution, ResolutionEngine, ResolveError};
