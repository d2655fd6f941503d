//! Public artwork resolution surface.
//!
//! One [`ResolutionEngine`] per process owns the cache, the in-flight table and the throttle.
//! Handles are cheap clones sharing that state. Lookups run as spawned tokio tasks, so a
//! started lookup always completes and populates the cache even if every caller stops
//! waiting. Methods that may start work must be called from within a tokio runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::artwork_key::{canonicalize, ArtworkKey};
use crate::artwork_preload::{ArtworkPreloader, HttpArtworkPreloader, ImagePreloadError};
use crate::config::{ArtworkConfig, FocusWindow};
use crate::fallback_art;
use crate::itunes_search::{ArtworkSearch, ItunesSearchClient, LookupError};
use crate::lookup_throttle::{AdmissionPriority, LookupPermit, LookupThrottle};
use crate::match_scoring;
use crate::priority_scheduler;
use crate::protocol::{
    ArtworkEvent, ArtworkItem, CacheEntry, ImageReference, PriorityTier, Provenance,
    SearchCandidate,
};
use crate::request_coordinator::{Claim, RequestCoordinator, ResolutionTicket};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("artist and track are both empty after normalization")]
    EmptyKey,
}

/// Result of a non-suspending [`ResolutionEngine::resolve`].
#[derive(Debug)]
pub enum Resolution {
    Ready(CacheEntry),
    Pending(ResolutionTicket),
}

impl Resolution {
    pub async fn wait(self) -> CacheEntry {
        match self {
            Self::Ready(entry) => entry,
            Self::Pending(ticket) => ticket.wait().await,
        }
    }
}

/// Counts from one focus-driven scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusPassSummary {
    /// Items whose lookup this pass started.
    pub submitted: usize,
    /// Items already cached or in flight when reached.
    pub already_known: usize,
    /// Items with nothing to look up.
    pub skipped: usize,
    /// True when a newer focus stopped this pass early.
    pub superseded: bool,
}

enum Submission {
    Known,
    Started(oneshot::Receiver<()>),
}

struct EngineInner {
    config: ArtworkConfig,
    coordinator: Mutex<RequestCoordinator>,
    throttle: LookupThrottle,
    search: Arc<dyn ArtworkSearch>,
    preloader: Option<Arc<dyn ArtworkPreloader>>,
    events: broadcast::Sender<ArtworkEvent>,
    focus_generation: AtomicU64,
}

#[derive(Clone)]
pub struct ResolutionEngine {
    inner: Arc<EngineInner>,
}

impl ResolutionEngine {
    /// Builds an engine talking to the live search service.
    pub fn new(config: ArtworkConfig) -> Self {
        let search: Arc<dyn ArtworkSearch> = Arc::new(ItunesSearchClient::new(config.lookup.clone()));
        let preloader: Option<Arc<dyn ArtworkPreloader>> = config.preload.enabled.then(|| {
            Arc::new(HttpArtworkPreloader::new(
                config.preload.timeout(),
                config.lookup.user_agent.clone(),
            )) as Arc<dyn ArtworkPreloader>
        });
        Self::with_collaborators(config, search, preloader)
    }

    pub fn with_collaborators(
        config: ArtworkConfig,
        search: Arc<dyn ArtworkSearch>,
        preloader: Option<Arc<dyn ArtworkPreloader>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let preloader = preloader.filter(|_| config.preload.enabled);
        Self {
            inner: Arc::new(EngineInner {
                throttle: LookupThrottle::new(&config.throttle),
                config,
                coordinator: Mutex::new(RequestCoordinator::new()),
                search,
                preloader,
                events,
                focus_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ArtworkConfig {
        &self.inner.config
    }

    fn coordinator(&self) -> MutexGuard<'_, RequestCoordinator> {
        self.inner.coordinator()
    }

    /// Change notifications for results landing and cache clears.
    pub fn subscribe(&self) -> broadcast::Receiver<ArtworkEvent> {
        self.inner.events.subscribe()
    }

    /// Non-suspending entry point: a cache hit is returned as `Ready` with no side effects,
    /// otherwise the caller is subscribed to the (possibly new) pending request.
    pub fn resolve(
        &self,
        artist: &str,
        track: &str,
        priority: PriorityTier,
    ) -> Result<Resolution, ResolveError> {
        let key = canonicalize(artist, track);
        if key.is_empty() {
            return Err(ResolveError::EmptyKey);
        }

        let mut coordinator = self.coordinator();
        match coordinator.claim(&key, priority) {
            Claim::Cached(entry) => {
                debug!("Artwork[{key}]: cache hit ({:?})", entry.provenance);
                Ok(Resolution::Ready(entry))
            }
            Claim::InFlight => {
                debug!("Artwork[{key}]: joining in-flight lookup");
                Ok(coordinator
                    .subscribe(&key)
                    .map(Resolution::Pending)
                    .unwrap_or_else(|| Resolution::Ready(fallback_entry(key))))
            }
            Claim::Claimed {
                request_id,
                priority,
            } => {
                let ticket = coordinator.subscribe(&key);
                drop(coordinator);
                self.spawn_lookup(request_id, key.clone(), artist, track, priority, None);
                Ok(ticket
                    .map(Resolution::Pending)
                    .unwrap_or_else(|| Resolution::Ready(fallback_entry(key))))
            }
        }
    }

    /// Resolves one pair; never fails for network reasons.
    pub async fn resolve_one(
        &self,
        artist: &str,
        track: &str,
        priority: PriorityTier,
    ) -> Result<CacheEntry, ResolveError> {
        Ok(self.resolve(artist, track, priority)?.wait().await)
    }

    /// The window a focus pass uses: `window` when given, otherwise the `[scheduling]` radii.
    pub fn focus_window(&self, window: Option<FocusWindow>) -> FocusWindow {
        window.unwrap_or_else(|| self.inner.config.scheduling.focus_window())
    }

    /// Starts background resolution of `items` around `focus_index`.
    ///
    /// Results arrive through [`ResolutionEngine::subscribe`] and the cache getters. Calling
    /// again supersedes the previous pass; lookups it already started still complete.
    pub fn resolve_for_focus(
        &self,
        items: Vec<ArtworkItem>,
        focus_index: usize,
        window: Option<FocusWindow>,
    ) -> JoinHandle<FocusPassSummary> {
        let window = self.focus_window(window);
        let generation = self.next_focus_generation();
        let engine = self.clone();
        tokio::spawn(async move {
            engine
                .focus_pass(generation, &items, focus_index, window)
                .await
        })
    }

    /// Runs one focus pass inline, returning once every planned item has been submitted.
    pub async fn run_focus_pass(
        &self,
        items: &[ArtworkItem],
        focus_index: usize,
        window: Option<FocusWindow>,
    ) -> FocusPassSummary {
        let window = self.focus_window(window);
        let generation = self.next_focus_generation();
        self.focus_pass(generation, items, focus_index, window).await
    }

    fn next_focus_generation(&self) -> u64 {
        self.inner.focus_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn focus_pass(
        &self,
        generation: u64,
        items: &[ArtworkItem],
        focus_index: usize,
        window: FocusWindow,
    ) -> FocusPassSummary {
        let mut summary = FocusPassSummary::default();
        let plan = priority_scheduler::plan(items, focus_index, window);
        for scheduled in plan {
            if self.inner.focus_generation.load(Ordering::SeqCst) != generation {
                summary.superseded = true;
                break;
            }
            if scheduled.key.is_empty() {
                summary.skipped += 1;
                continue;
            }
            let item = &items[scheduled.index];
            match self.submit(&scheduled.key, &item.artist, &item.track, scheduled.tier) {
                Submission::Known => summary.already_known += 1,
                Submission::Started(started) => {
                    // Next submission waits until this lookup has passed the throttle.
                    let _ = started.await;
                    summary.submitted += 1;
                }
            }
        }
        debug!(
            "Focus pass {generation} around {focus_index}: submitted={} known={} skipped={} superseded={}",
            summary.submitted, summary.already_known, summary.skipped, summary.superseded
        );
        summary
    }

    fn submit(
        &self,
        key: &ArtworkKey,
        artist: &str,
        track: &str,
        priority: PriorityTier,
    ) -> Submission {
        let claim = self.coordinator().claim(key, priority);
        match claim {
            Claim::Cached(_) | Claim::InFlight => Submission::Known,
            Claim::Claimed {
                request_id,
                priority,
            } => {
                let (started_tx, started_rx) = oneshot::channel();
                self.spawn_lookup(
                    request_id,
                    key.clone(),
                    artist,
                    track,
                    priority,
                    Some(started_tx),
                );
                Submission::Started(started_rx)
            }
        }
    }

    fn spawn_lookup(
        &self,
        request_id: u64,
        key: ArtworkKey,
        artist: &str,
        track: &str,
        priority: AdmissionPriority,
        started: Option<oneshot::Sender<()>>,
    ) {
        let inner = Arc::clone(&self.inner);
        let artist = artist.to_string();
        let track = track.to_string();
        tokio::spawn(async move {
            inner
                .run_lookup(request_id, key, artist, track, priority, started)
                .await;
        });
    }

    pub fn get_cached(&self, key: &ArtworkKey) -> Option<ImageReference> {
        self.coordinator()
            .cached(key)
            .map(|entry| entry.image.clone())
    }

    pub fn get_entry(&self, key: &ArtworkKey) -> Option<CacheEntry> {
        self.coordinator().cached(key).cloned()
    }

    pub fn get_cached_for(&self, artist: &str, track: &str) -> Option<ImageReference> {
        self.get_cached(&canonicalize(artist, track))
    }

    pub fn is_pending(&self, key: &ArtworkKey) -> bool {
        self.coordinator().is_pending(key)
    }

    /// Percentage in `[0, 100]` of `items` with a cached entry of either provenance.
    ///
    /// Items with nothing to look up are left out; an empty set counts as complete.
    pub fn progress(&self, items: &[ArtworkItem]) -> f64 {
        let keys: Vec<ArtworkKey> = items
            .iter()
            .map(|item| canonicalize(&item.artist, &item.track))
            .filter(|key| !key.is_empty())
            .collect();
        if keys.is_empty() {
            return 100.0;
        }
        let coordinator = self.coordinator();
        let resolved = keys
            .iter()
            .filter(|key| coordinator.cached(key).is_some())
            .count();
        resolved as f64 * 100.0 / keys.len() as f64
    }

    /// Drops the cache and detaches in-flight requests; their current subscribers still
    /// receive results, later callers start fresh lookups.
    pub fn clear_all(&self) {
        let dropped_entries = self.coordinator().clear_all();
        info!("Artwork cache cleared ({dropped_entries} entries)");
        let _ = self
            .inner
            .events
            .send(ArtworkEvent::CacheCleared { dropped_entries });
    }

    pub fn cache_len(&self) -> usize {
        self.coordinator().cache_len()
    }

    pub fn pending_len(&self) -> usize {
        self.coordinator().pending_len()
    }
}

fn fallback_entry(key: ArtworkKey) -> CacheEntry {
    CacheEntry {
        image: fallback_art::synthesize(&key),
        key,
        provenance: Provenance::Fallback,
        resolved_at_unix_ms: crate::artwork_cache::now_unix_ms(),
    }
}

impl EngineInner {
    fn coordinator(&self) -> MutexGuard<'_, RequestCoordinator> {
        self.coordinator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs the blocking search while holding `permit`; the slot stays taken until the call
    /// returns, even when the caller has already given up on it.
    async fn search_candidates(
        &self,
        permit: LookupPermit,
        artist: &str,
        track: &str,
    ) -> Result<Vec<SearchCandidate>, LookupError> {
        let search = Arc::clone(&self.search);
        let artist = artist.to_string();
        let track = track.to_string();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            search.search(&artist, &track)
        });
        match tokio::time::timeout(self.config.lookup.request_timeout(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(LookupError::Network(format!(
                "search task failed: {join_error}"
            ))),
            Err(_) => Err(LookupError::Timeout),
        }
    }

    async fn preload(&self, image: &ImageReference) -> Result<(), ImagePreloadError> {
        let Some(preloader) = self.preloader.as_ref().map(Arc::clone) else {
            return Ok(());
        };
        if !image.is_remote() {
            return Ok(());
        }
        let image = image.clone();
        let task = tokio::task::spawn_blocking(move || preloader.preload(&image));
        match tokio::time::timeout(self.config.preload.timeout(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ImagePreloadError::LoadFailed(format!(
                "preload task failed: {join_error}"
            ))),
            Err(_) => Err(ImagePreloadError::Timeout),
        }
    }

    /// Search, score and verify; every failure degrades to the placeholder.
    async fn lookup_artwork(
        &self,
        key: &ArtworkKey,
        artist: &str,
        track: &str,
        priority: AdmissionPriority,
        started: Option<oneshot::Sender<()>>,
    ) -> (ImageReference, Provenance) {
        let permit = self.throttle.acquire(priority.clone()).await;
        if let Some(started) = started {
            let _ = started.send(());
        }
        debug!(
            "Artwork[{key}]: lookup #{} started ({:?})",
            permit.sequence(),
            priority.tier()
        );
        let searched = self.search_candidates(permit, artist, track).await;

        let candidates = match searched {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!("Artwork[{key}]: lookup failed ({error}), using fallback");
                return (fallback_art::synthesize(key), Provenance::Fallback);
            }
        };
        let selected = match_scoring::best_match(
            &candidates,
            artist,
            track,
            self.config.matching.min_match_score,
        )
        .and_then(|candidate| candidate.artwork.clone());
        let Some(image) = selected else {
            debug!(
                "Artwork[{key}]: no usable match among {} candidates, using fallback",
                candidates.len()
            );
            return (fallback_art::synthesize(key), Provenance::Fallback);
        };

        match self.preload(&image).await {
            Ok(()) => (image, Provenance::Exact),
            Err(error) => {
                warn!("Artwork[{key}]: preload failed ({error}), using fallback");
                (fallback_art::synthesize(key), Provenance::Fallback)
            }
        }
    }

    async fn run_lookup(
        &self,
        request_id: u64,
        key: ArtworkKey,
        artist: String,
        track: String,
        priority: AdmissionPriority,
        started: Option<oneshot::Sender<()>>,
    ) {
        let (image, provenance) = self
            .lookup_artwork(&key, &artist, &track, priority, started)
            .await;
        let settlement = self.coordinator().settle(request_id, image, provenance);
        if let Some(settlement) = settlement.filter(|settlement| settlement.cached) {
            let _ = self.events.send(ArtworkEvent::Resolved {
                key,
                entry: settlement.entry,
            });
        }
    }
}
