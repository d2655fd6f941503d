//! Cache lookups, in-flight dedup and subscriber bookkeeping.
//!
//! All methods are synchronous; the engine keeps the coordinator behind a mutex that is never
//! held across an await, so a key is claimed before any suspension point can interleave.

use std::collections::HashMap;

use log::debug;
use tokio::sync::oneshot;

use crate::artwork_cache::{now_unix_ms, ArtworkCache};
use crate::artwork_key::ArtworkKey;
use crate::fallback_art;
use crate::lookup_throttle::AdmissionPriority;
use crate::protocol::{CacheEntry, ImageReference, PriorityTier, Provenance};

/// Outcome of [`RequestCoordinator::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Cached(CacheEntry),
    /// Another request for the key is already in flight.
    InFlight,
    /// The caller now owns a new pending request and must settle it. `priority` is shared with
    /// the request, so later claims for the same key can raise it while it waits for admission.
    Claimed {
        request_id: u64,
        priority: AdmissionPriority,
    },
}

#[derive(Debug)]
struct PendingRequest {
    key: ArtworkKey,
    priority: AdmissionPriority,
    subscribers: Vec<oneshot::Sender<CacheEntry>>,
    cancelled: bool,
}

/// Eventual result of one pending request.
#[derive(Debug)]
pub struct ResolutionTicket {
    key: ArtworkKey,
    receiver: oneshot::Receiver<CacheEntry>,
}

impl ResolutionTicket {
    pub fn key(&self) -> &ArtworkKey {
        &self.key
    }

    /// Waits for the request to settle.
    ///
    /// If the lookup task died without settling, the caller still gets the placeholder.
    pub async fn wait(self) -> CacheEntry {
        match self.receiver.await {
            Ok(entry) => entry,
            Err(_) => CacheEntry {
                image: fallback_art::synthesize(&self.key),
                key: self.key,
                provenance: Provenance::Fallback,
                resolved_at_unix_ms: now_unix_ms(),
            },
        }
    }
}

/// What [`RequestCoordinator::settle`] did with a finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub entry: CacheEntry,
    /// False when the request was detached by a clear and its result was not cached.
    pub cached: bool,
    pub notified: usize,
}

#[derive(Debug, Default)]
pub struct RequestCoordinator {
    cache: ArtworkCache,
    pending_by_key: HashMap<ArtworkKey, u64>,
    requests: HashMap<u64, PendingRequest>,
    next_request_id: u64,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self, key: &ArtworkKey) -> Option<&CacheEntry> {
        self.cache.get(key)
    }

    pub fn is_pending(&self, key: &ArtworkKey) -> bool {
        self.pending_by_key.contains_key(key)
    }

    /// Returns the cached entry, reports an in-flight request, or claims a new one.
    pub fn claim(&mut self, key: &ArtworkKey, priority: PriorityTier) -> Claim {
        if let Some(entry) = self.cache.get(key) {
            return Claim::Cached(entry.clone());
        }
        if let Some(request_id) = self.pending_by_key.get(key) {
            if let Some(pending) = self.requests.get(request_id) {
                pending.priority.raise(priority);
            }
            return Claim::InFlight;
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let priority = AdmissionPriority::new(priority);
        self.pending_by_key.insert(key.clone(), request_id);
        self.requests.insert(
            request_id,
            PendingRequest {
                key: key.clone(),
                priority: priority.clone(),
                subscribers: Vec::new(),
                cancelled: false,
            },
        );
        Claim::Claimed {
            request_id,
            priority,
        }
    }

    /// Attaches a subscriber to the live pending request for `key`.
    pub fn subscribe(&mut self, key: &ArtworkKey) -> Option<ResolutionTicket> {
        let request_id = self.pending_by_key.get(key)?;
        let pending = self.requests.get_mut(request_id)?;
        let (sender, receiver) = oneshot::channel();
        pending.subscribers.push(sender);
        Some(ResolutionTicket {
            key: key.clone(),
            receiver,
        })
    }

    /// Records the result of `request_id` and notifies its subscribers in subscription order.
    pub fn settle(
        &mut self,
        request_id: u64,
        image: ImageReference,
        provenance: Provenance,
    ) -> Option<Settlement> {
        let pending = self.requests.remove(&request_id)?;
        let cached = !pending.cancelled;
        let entry = if cached {
            if self.pending_by_key.get(&pending.key) == Some(&request_id) {
                self.pending_by_key.remove(&pending.key);
            }
            self.cache.insert_once(pending.key.clone(), image, provenance)
        } else {
            CacheEntry {
                key: pending.key.clone(),
                image,
                provenance,
                resolved_at_unix_ms: now_unix_ms(),
            }
        };

        let mut notified = 0;
        for subscriber in pending.subscribers {
            if subscriber.send(entry.clone()).is_ok() {
                notified += 1;
            }
        }
        debug!(
            "Artwork[{}]: settled {:?} (cached={}, notified={})",
            entry.key, entry.provenance, cached, notified
        );
        Some(Settlement {
            entry,
            cached,
            notified,
        })
    }

    /// Empties the cache and detaches in-flight requests from their keys.
    ///
    /// Detached requests still notify the subscribers they already have, but new callers start
    /// fresh work instead of joining them.
    pub fn clear_all(&mut self) -> usize {
        for pending in self.requests.values_mut() {
            pending.cancelled = true;
        }
        self.pending_by_key.clear();
        self.cache.clear()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_by_key.len()
    }
}
