//! Admission control for external search calls.
//!
//! A caller holds the admission gate while it waits for a free in-flight slot, any pending
//! inter-batch pause and the start-spacing limiter; the gate is then handed to the next waiter
//! by (priority tier, arrival) order. Requests are only ever delayed, never dropped.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::{trace, warn};
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};

use crate::config::ThrottleConfig;
use crate::protocol::PriorityTier;

/// Shared, raisable admission rank of one request.
///
/// Clones observe the same rank, so raising it through any handle also reorders a waiter that
/// is already queued at the gate.
#[derive(Debug, Clone)]
pub struct AdmissionPriority(Arc<AtomicU8>);

impl AdmissionPriority {
    pub fn new(tier: PriorityTier) -> Self {
        Self(Arc::new(AtomicU8::new(tier.admission_rank())))
    }

    /// Raises the rank to `tier` when that is more urgent; never lowers it.
    pub fn raise(&self, tier: PriorityTier) {
        self.0.fetch_min(tier.admission_rank(), Ordering::SeqCst);
    }

    pub fn rank(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn tier(&self) -> PriorityTier {
        match self.rank() {
            0 => PriorityTier::High,
            1 => PriorityTier::Normal,
            _ => PriorityTier::Low,
        }
    }
}

impl From<PriorityTier> for AdmissionPriority {
    fn from(tier: PriorityTier) -> Self {
        Self::new(tier)
    }
}

impl PartialEq for AdmissionPriority {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for AdmissionPriority {}

#[derive(Debug)]
struct Waiter {
    priority: AdmissionPriority,
    sender: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct AdmissionState {
    gate_busy: bool,
    next_arrival: u64,
    waiting: BTreeMap<u64, Waiter>,
}

impl AdmissionState {
    /// Arrival number of the most urgent waiter, FIFO within one rank.
    fn next_waiter(&self) -> Option<u64> {
        self.waiting
            .iter()
            .min_by_key(|(arrival, waiter)| (waiter.priority.rank(), **arrival))
            .map(|(arrival, _)| *arrival)
    }
}

/// Held for the duration of one external call; dropping it frees the in-flight slot.
#[derive(Debug)]
pub struct LookupPermit {
    _slot: Option<OwnedSemaphorePermit>,
    sequence: u64,
}

impl LookupPermit {
    /// Zero-based start order of this call.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

pub struct LookupThrottle {
    pacer: Option<DefaultDirectRateLimiter>,
    slots: Arc<Semaphore>,
    max_concurrent: u64,
    batch_pause: Duration,
    started: AtomicU64,
    admission: Mutex<AdmissionState>,
}

struct GateGuard<'a> {
    throttle: &'a LookupThrottle,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.throttle.release_gate();
    }
}

struct GateWaiter<'a> {
    throttle: &'a LookupThrottle,
    receiver: Option<oneshot::Receiver<()>>,
}

impl<'a> GateWaiter<'a> {
    async fn wait(mut self) -> GateGuard<'a> {
        if let Some(receiver) = self.receiver.as_mut() {
            // Senders are only dropped after a successful hand-off attempt.
            let _ = receiver.await;
        }
        self.receiver = None;
        GateGuard {
            throttle: self.throttle,
        }
    }
}

impl Drop for GateWaiter<'_> {
    fn drop(&mut self) {
        let Some(mut receiver) = self.receiver.take() else {
            return;
        };
        receiver.close();
        if receiver.try_recv().is_ok() {
            self.throttle.release_gate();
        }
    }
}

impl LookupThrottle {
    pub fn new(config: &ThrottleConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        let pacer = Quota::with_period(Duration::from_millis(config.min_spacing_ms)).map(|quota| {
            RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN))
        });
        Self {
            pacer,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent: max_concurrent as u64,
            batch_pause: Duration::from_millis(config.batch_pause_ms),
            started: AtomicU64::new(0),
            admission: Mutex::new(AdmissionState::default()),
        }
    }

    fn lock_admission(&self) -> MutexGuard<'_, AdmissionState> {
        self.admission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release_gate(&self) {
        let mut state = self.lock_admission();
        while let Some(arrival) = state.next_waiter() {
            let Some(waiter) = state.waiting.remove(&arrival) else {
                break;
            };
            if waiter.sender.send(()).is_ok() {
                return;
            }
        }
        state.gate_busy = false;
    }

    async fn enter_gate(&self, priority: AdmissionPriority) -> GateGuard<'_> {
        let receiver = {
            let mut state = self.lock_admission();
            if !state.gate_busy {
                state.gate_busy = true;
                return GateGuard { throttle: self };
            }
            let arrival = state.next_arrival;
            state.next_arrival += 1;
            let (sender, receiver) = oneshot::channel();
            state.waiting.insert(arrival, Waiter { priority, sender });
            receiver
        };
        GateWaiter {
            throttle: self,
            receiver: Some(receiver),
        }
        .wait()
        .await
    }

    /// Suspends until the next external call may start.
    ///
    /// Waiters are admitted by the rank `priority` holds at hand-off time, not at arrival.
    pub async fn acquire(&self, priority: AdmissionPriority) -> LookupPermit {
        let _gate = self.enter_gate(priority).await;
        let slot = match Arc::clone(&self.slots).acquire_owned().await {
            Ok(slot) => Some(slot),
            Err(error) => {
                warn!("Throttle: lookup slots unavailable ({error}), admitting without a slot");
                None
            }
        };

        let sequence = self.started.load(Ordering::SeqCst);
        if sequence > 0 && sequence % self.max_concurrent == 0 && !self.batch_pause.is_zero() {
            trace!("Throttle: batch boundary at call {sequence}, pausing {:?}", self.batch_pause);
            tokio::time::sleep(self.batch_pause).await;
        }
        if let Some(pacer) = self.pacer.as_ref() {
            pacer.until_ready().await;
        }
        self.started.store(sequence + 1, Ordering::SeqCst);
        LookupPermit {
            _slot: slot,
            sequence,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.max_concurrent as usize - self.slots.available_permits()
    }

    pub fn queued(&self) -> usize {
        self.lock_admission().waiting.len()
    }
}
