//! Replay cache for consumed authorization nonces.
//!
//! The authorization nonce is the sole replay-prevention key: once a proof
//! has passed facilitator verification, its `(network, nonce)` pair is
//! claimed here before settlement is attempted, and the claim is never
//! released while the authorization remains valid. Two concurrent requests
//! presenting the same proof therefore race on a single atomic
//! check-and-insert; exactly one wins.
//!
//! The store is injected into the payee guard explicitly rather than living
//! in a process-wide singleton, so hosts can share one cache across routes
//! or isolate them per route as they see fit.

use alloy_primitives::B256;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::timestamp::UnixTimestamp;

/// Tracks consumed authorization nonces per network.
///
/// Implementations must be safe under arbitrary concurrent invocation, and
/// [`try_claim`](ReplayCache::try_claim) must be atomic: of any number of
/// concurrent claims for the same `(network, nonce)`, exactly one returns
/// `true`.
pub trait ReplayCache: Send + Sync {
    /// Returns `true` if the nonce has already been claimed.
    ///
    /// A cheap pre-check; the authoritative decision is made by
    /// [`try_claim`](ReplayCache::try_claim).
    fn contains(&self, network: &str, nonce: &B256) -> bool;

    /// Atomically claims a nonce, recording the authorization's expiry.
    ///
    /// Returns `false` if the nonce was already claimed.
    fn try_claim(&self, network: &str, nonce: &B256, valid_before: UnixTimestamp) -> bool;

    /// Removes entries whose authorization expired before `now`, minus the
    /// implementation's safety margin.
    fn evict_expired(&self, now: UnixTimestamp);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReplayKey {
    network: String,
    nonce: B256,
}

/// In-memory, process-wide replay cache.
///
/// Entries are claimed with a single sharded-map entry operation and evicted
/// once `valid_before` plus a safety margin has passed. Eviction runs
/// opportunistically every [`Self::EVICTION_STRIDE`] claims, so long-lived
/// processes do not need a background sweeper (though hosts may still call
/// [`ReplayCache::evict_expired`] from one).
#[derive(Debug, Default)]
pub struct InMemoryReplayCache {
    entries: DashMap<ReplayKey, UnixTimestamp>,
    claims: AtomicU64,
}

impl InMemoryReplayCache {
    /// Seconds an entry outlives its authorization's `validBefore`.
    ///
    /// Covers clock skew between the seller and clients; a nonce presented
    /// just before expiry must still be recognizably spent just after.
    pub const EVICTION_MARGIN_SECS: u64 = 60;

    /// Claims between opportunistic eviction sweeps.
    const EVICTION_STRIDE: u64 = 256;

    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of currently tracked nonces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no nonces are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReplayCache for InMemoryReplayCache {
    fn contains(&self, network: &str, nonce: &B256) -> bool {
        let key = ReplayKey {
            network: network.to_string(),
            nonce: *nonce,
        };
        self.entries.contains_key(&key)
    }

    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "x402.replay.try_claim", skip(self))
    )]
    fn try_claim(&self, network: &str, nonce: &B256, valid_before: UnixTimestamp) -> bool {
        let claims = self.claims.fetch_add(1, Ordering::Relaxed);
        if claims % Self::EVICTION_STRIDE == 0 {
            self.evict_expired(UnixTimestamp::now());
        }

        let key = ReplayKey {
            network: network.to_string(),
            nonce: *nonce,
        };
        // The entry API locks the shard for the whole check-then-insert,
        // which is what makes concurrent duplicate proofs lose the race.
        match self.entries.entry(key) {
            Entry::Occupied(_) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!("nonce already claimed, rejecting as replay");
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(valid_before);
                true
            }
        }
    }

    fn evict_expired(&self, now: UnixTimestamp) {
        self.entries
            .retain(|_, valid_before| *valid_before + Self::EVICTION_MARGIN_SECS > now);
    }
}
