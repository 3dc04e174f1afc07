//! Short-TTL memo of proxy locators

use lru::LruCache;
use segue_core::{MediaReference, ResolvedLocator};
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

struct MemoEntry {
    locator: ResolvedLocator,
    stored_at: Instant,
}

/// LRU memo whose entries expire after a fixed TTL
///
/// Only proxy results are memoized; local fast paths are recomputed every
/// time because download completion can change between calls.
pub(crate) struct LocatorMemo {
    entries: Mutex<LruCache<MediaReference, MemoEntry>>,
    ttl: Duration,
}

impl LocatorMemo {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub(crate) fn get(&self, reference: &MediaReference) -> Option<ResolvedLocator> {
        if self.ttl.is_zero() {
            return None;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(reference) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                return Some(entry.locator.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(reference);
        }
        None
    }

    pub(crate) fn put(&self, reference: MediaReference, locator: ResolvedLocator) {
        if self.ttl.is_zero() {
            return;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(
            reference,
            MemoEntry {
                locator,
                stored_at: Instant::now(),
            },
        );
    }

    pub(crate) fn remove(&self, reference: &MediaReference) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.pop(reference);
    }

    pub(crate) fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
