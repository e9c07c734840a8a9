//! Time-to-live cache for reference-data listings.
//!
//! # Invariants
//! - An entry older than the TTL is never returned.
//! - `invalidate(kind)` takes effect before it returns, and a listing loaded
//!   before an invalidation is never stored after it (generation check).
//! - Readers may see data up to one TTL old if a write bypassed the
//!   repository; this staleness is accepted.

use crate::model::reference::{ReferenceEntry, ReferenceKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default lifetime of a cached reference listing.
pub const DEFAULT_REFERENCE_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedListing {
    loaded_at: Instant,
    entries: Arc<Vec<ReferenceEntry>>,
}

#[derive(Default)]
struct CacheState {
    listings: HashMap<ReferenceKind, CachedListing>,
    generations: HashMap<ReferenceKind, u64>,
}

/// Per-kind cache of ordered reference listings.
pub struct ReferenceCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl ReferenceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached listing when it is still fresh.
    pub fn get(&self, kind: ReferenceKind) -> Option<Arc<Vec<ReferenceEntry>>> {
        let mut state = self.lock();
        let fresh = state
            .listings
            .get(&kind)
            .is_some_and(|cached| cached.loaded_at.elapsed() < self.ttl);
        if !fresh {
            state.listings.remove(&kind);
            return None;
        }
        state
            .listings
            .get(&kind)
            .map(|cached| Arc::clone(&cached.entries))
    }

    /// Invalidation counter for `kind`. Read it before loading a listing and
    /// hand it back to [`ReferenceCache::put`].
    pub fn generation(&self, kind: ReferenceKind) -> u64 {
        self.lock().generations.get(&kind).copied().unwrap_or(0)
    }

    /// Stores a listing loaded at `generation` and returns the shared handle.
    /// The listing is returned but not cached when `kind` was invalidated
    /// since that generation was read.
    pub fn put(
        &self,
        kind: ReferenceKind,
        generation: u64,
        listing: Vec<ReferenceEntry>,
    ) -> Arc<Vec<ReferenceEntry>> {
        let listing = Arc::new(listing);
        let mut state = self.lock();
        let current = state.generations.get(&kind).copied().unwrap_or(0);
        if current == generation {
            state.listings.insert(
                kind,
                CachedListing {
                    loaded_at: Instant::now(),
                    entries: Arc::clone(&listing),
                },
            );
        }
        listing
    }

    pub fn invalidate(&self, kind: ReferenceKind) {
        let mut state = self.lock();
        state.listings.remove(&kind);
        *state.generations.entry(kind).or_insert(0) += 1;
    }

    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        state.listings.clear();
        for kind in ReferenceKind::ALL {
            *state.generations.entry(kind).or_insert(0) += 1;
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::ReferenceCache;
    use crate::model::reference::{ReferenceEntry, ReferenceKind};
    use std::time::Duration;

    fn tier(id: i64, name: &str) -> ReferenceEntry {
        ReferenceEntry {
            id,
            kind: ReferenceKind::Tier,
            name: name.to_string(),
            display_order: Some(0),
            color: None,
            icon: None,
            description: None,
            created_at: 0,
        }
    }

    #[test]
    fn returns_fresh_entries() {
        let cache = ReferenceCache::new(Duration::from_secs(60));
        cache.put(ReferenceKind::Tier, 0, vec![tier(1, "T1")]);

        let cached = cache.get(ReferenceKind::Tier).expect("fresh entry");
        assert_eq!(cached.len(), 1);
        assert!(cache.get(ReferenceKind::Rarity).is_none());
    }

    #[test]
    fn zero_ttl_never_serves_cached_entries() {
        let cache = ReferenceCache::new(Duration::ZERO);
        cache.put(ReferenceKind::Tier, 0, vec![tier(1, "T1")]);
        assert!(cache.get(ReferenceKind::Tier).is_none());
    }

    #[test]
    fn invalidate_only_drops_one_kind() {
        let cache = ReferenceCache::new(Duration::from_secs(60));
        cache.put(ReferenceKind::Tier, 0, vec![tier(1, "T1")]);
        cache.put(ReferenceKind::ItemType, 0, vec![]);

        cache.invalidate(ReferenceKind::Tier);
        assert!(cache.get(ReferenceKind::Tier).is_none());
        assert!(cache.get(ReferenceKind::ItemType).is_some());

        cache.invalidate_all();
        assert!(cache.get(ReferenceKind::ItemType).is_none());
    }

    #[test]
    fn listing_loaded_before_invalidation_is_not_cached() {
        let cache = ReferenceCache::new(Duration::from_secs(60));
        let before = cache.generation(ReferenceKind::Tier);

        // A write lands between the load and the store.
        cache.invalidate(ReferenceKind::Tier);
        let stale = cache.put(ReferenceKind::Tier, before, vec![tier(1, "T1")]);
        assert_eq!(stale.len(), 1);
        assert!(cache.get(ReferenceKind::Tier).is_none());

        let current = cache.generation(ReferenceKind::Tier);
        assert_ne!(current, before);
        cache.put(ReferenceKind::Tier, current, vec![tier(1, "T1"), tier(2, "T2")]);
        assert_eq!(cache.get(ReferenceKind::Tier).expect("cached").len(), 2);
    }

    #[test]
    fn invalidate_all_advances_every_generation() {
        let cache = ReferenceCache::new(Duration::from_secs(60));
        let tier_before = cache.generation(ReferenceKind::Tier);
        let rarity_before = cache.generation(ReferenceKind::Rarity);

        cache.invalidate_all();
        cache.put(ReferenceKind::Rarity, rarity_before, vec![]);
        assert!(cache.get(ReferenceKind::Rarity).is_none());
        assert_ne!(cache.generation(ReferenceKind::Tier), tier_before);
    }
}
