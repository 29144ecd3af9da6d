//! Stable vehicle identities
//!
//! The radar feed correlates observations through trip ids that are neither
//! human-readable nor guaranteed to stay stable. This registry maps each trip
//! id to a short display id of the form `<routeId>-<n>` that stays the same
//! for as long as the trip id keeps reappearing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct IdentityEntry {
    vehicle_id: String,
    last_seen: Instant,
}

/// Concurrency-safe trip-id to vehicle-id mapping with time-based eviction.
///
/// Entries are touched on every resolve and evicted by [`prune`] once they
/// have not been seen for the configured TTL, so the mapping stays bounded
/// over long uptimes.
///
/// [`prune`]: VehicleIdentityRegistry::prune
pub struct VehicleIdentityRegistry {
    assignments: DashMap<String, IdentityEntry>,
    /// Shared across all routes; ids are display labels, not per-route sequences
    next_id: AtomicU64,
}

impl VehicleIdentityRegistry {
    pub fn new() -> Self {
        Self {
            assignments: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Resolve a stable vehicle id for a movement.
    ///
    /// A movement without a trip id gets a fresh id on every call; there is
    /// no key to stabilize identity with.
    pub fn resolve(&self, trip_id: Option<&str>, route_id: &str) -> String {
        let Some(trip_id) = trip_id else {
            return self.allocate(route_id);
        };

        let mut entry = self
            .assignments
            .entry(trip_id.to_string())
            .or_insert_with(|| IdentityEntry {
                vehicle_id: self.allocate(route_id),
                last_seen: Instant::now(),
            });
        entry.last_seen = Instant::now();
        entry.vehicle_id.clone()
    }

    /// Drop every mapping that has not been resolved within `ttl`
    pub fn prune(&self, ttl: Duration) {
        let now = Instant::now();
        let before = self.assignments.len();
        self.assignments
            .retain(|_, entry| now.duration_since(entry.last_seen) <= ttl);
        // retain releases each shard as it goes, so concurrent resolves can
        // grow the map mid-scan and the final len may exceed the starting one
        let evicted = before.saturating_sub(self.assignments.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.assignments.len(), "Pruned vehicle identities");
        }
    }

    /// Number of currently tracked trip ids
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    fn allocate(&self, route_id: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", route_id, n)
    }
}

impl Default for VehicleIdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
