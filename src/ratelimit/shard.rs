//! A lock-scoped partition of the bucket keyspace.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use super::bucket::{Quota, TokenBucket};

pub(crate) type SharedBucket = Arc<Mutex<TokenBucket>>;

/// Buckets for the keys that hash to this shard.
///
/// The map lock only guards structure (insert and remove); token arithmetic
/// happens under each bucket's own mutex.
#[derive(Default)]
pub(crate) struct Shard {
    buckets: RwLock<HashMap<String, SharedBucket>>,
}

impl Shard {
    /// Return the bucket for `key`, creating a full one on first sight.
    pub(crate) fn bucket(&self, key: &str, quota: Quota) -> SharedBucket {
        if let Some(bucket) = self.buckets.read().get(key) {
            return bucket.clone();
        }

        let mut buckets = self.buckets.write();
        // Another caller may have inserted it between the two locks
        buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, "Creating token bucket");
                Arc::new(Mutex::new(TokenBucket::full(quota, Instant::now())))
            })
            .clone()
    }

    /// Look up an existing bucket without creating one.
    pub(crate) fn get(&self, key: &str) -> Option<SharedBucket> {
        self.buckets.read().get(key).cloned()
    }

    /// Remove buckets not used since `cutoff`; returns how many were removed.
    pub(crate) fn evict_idle(&self, cutoff: Instant) -> usize {
        let candidates = self.idle_candidates(cutoff);
        if candidates.is_empty() {
            return 0;
        }
        self.remove_if_idle(&candidates, cutoff)
    }

    /// Keys whose buckets were idle at `cutoff`, collected under the read lock.
    pub(crate) fn idle_candidates(&self, cutoff: Instant) -> Vec<String> {
        self.buckets
            .read()
            .iter()
            .filter(|(_, bucket)| bucket.lock().is_idle(cutoff))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Remove the given keys under the write lock, skipping any bucket used
    /// since the candidates were collected.
    pub(crate) fn remove_if_idle(&self, candidates: &[String], cutoff: Instant) -> usize {
        let mut buckets = self.buckets.write();
        let mut evicted = 0;
        for key in candidates {
            let still_idle = buckets
                .get(key)
                .is_some_and(|bucket| bucket.lock().is_idle(cutoff));
            if still_idle {
                buckets.remove(key);
                evicted += 1;
            }
        }
        evicted
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const QUOTA: Quota = Quota {
        rate: 1.0,
        capacity: 5.0,
    };

    #[test]
    fn test_bucket_created_once() {
        let shard = Shard::default();

        let first = shard.bucket("a", QUOTA);
        first.lock().try_acquire(QUOTA, Instant::now());
        let second = shard.bucket("a", QUOTA);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(shard.len(), 1);
        assert!(shard.get("b").is_none());
    }

    #[test]
    fn test_concurrent_first_sight_shares_bucket() {
        let shard = Arc::new(Shard::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shard = shard.clone();
                std::thread::spawn(move || shard.bucket("same", QUOTA))
            })
            .collect();
        let buckets: Vec<SharedBucket> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(buckets.iter().all(|b| Arc::ptr_eq(b, &buckets[0])));
        assert_eq!(shard.len(), 1);
    }

    #[test]
    fn test_evict_idle_keeps_recent() {
        let shard = Shard::default();
        shard.bucket("old", QUOTA);
        shard.bucket("new", QUOTA);

        let later = Instant::now() + Duration::from_secs(10);
        shard
            .get("new")
            .unwrap()
            .lock()
            .try_acquire(QUOTA, later);

        let evicted = shard.evict_idle(later);

        assert_eq!(evicted, 1);
        assert!(shard.get("old").is_none());
        assert!(shard.get("new").is_some());
    }

    #[test]
    fn test_evict_nothing_idle() {
        let shard = Shard::default();
        let start = Instant::now();
        shard.bucket("a", QUOTA);

        assert_eq!(shard.evict_idle(start - Duration::from_secs(1)), 0);
        assert_eq!(shard.len(), 1);
    }

    #[test]
    fn test_bucket_used_after_scan_survives_removal() {
        let shard = Shard::default();
        let start = Instant::now();
        shard.bucket("touched", QUOTA);
        shard.bucket("untouched", QUOTA);

        let cutoff = start + Duration::from_secs(10);
        let mut candidates = shard.idle_candidates(cutoff);
        candidates.sort();
        assert_eq!(candidates, ["touched", "untouched"]);

        // A request lands between the scan and the delete.
        assert!(shard
            .get("touched")
            .unwrap()
            .lock()
            .try_acquire(QUOTA, cutoff + Duration::from_millis(1)));

        assert_eq!(shard.remove_if_idle(&candidates, cutoff), 1);
        assert!(shard.get("touched").is_some());
        assert!(shard.get("untouched").is_none());
    }

    #[test]
    fn test_remove_skips_missing_keys() {
        let shard = Shard::default();
        let start = Instant::now();
        shard.bucket("a", QUOTA);

        let candidates = vec!["a".to_string(), "gone".to_string()];
        assert_eq!(shard.remove_if_idle(&candidates, start + Duration::from_secs(1)), 1);
        assert_eq!(shard.len(), 0);
    }
}
