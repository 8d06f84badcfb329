use std::collections::HashMap;
use std::sync::Mutex;

use metrics::counter;

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Derive the deduplication key for a logical user action.
///
/// The timestamp is truncated to the second on purpose: the browser pixel
/// derives the same key for the same action, and the platform reconciles
/// the two deliveries through it. Widening the key here would break that
/// contract.
pub fn dedup_key(event_name: &str, session_id: &str, occurred_at_millis: i64) -> String {
    format!("{}_{}_{}", event_name, session_id, occurred_at_millis / 1000)
}

/// Time-windowed set of already-forwarded event keys.
///
/// The map is only reachable through `admit`/`purge_expired`, and the
/// purge-check-insert sequence runs under a single lock acquisition, so
/// two near-simultaneous calls for one key can never both be admitted.
///
/// There is no capacity bound beyond the window sweep; at funnel traffic
/// volumes the 24h window is the effective memory bound.
pub struct DedupCache {
    window_millis: i64,
    entries: Mutex<HashMap<String, i64>>,
}

impl DedupCache {
    pub fn new(window_hours: u64) -> Self {
        Self {
            window_millis: window_hours as i64 * MILLIS_PER_HOUR,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when the key is new and was admitted, false when it is
    /// a duplicate inside the window.
    pub fn admit(&self, key: &str, now_millis: i64) -> bool {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");

        entries.retain(|_, first_seen| now_millis - *first_seen < self.window_millis);

        if entries.contains_key(key) {
            counter!("tracking_events_duplicate_total").increment(1);
            return false;
        }
        entries.insert(key.to_string(), now_millis);
        true
    }

    /// Drop entries older than the window. `admit` already does this
    /// inline; the periodic sweep exists so an idle process does not hold
    /// a day of keys forever.
    pub fn purge_expired(&self, now_millis: i64) -> usize {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, first_seen| now_millis - *first_seen < self.window_millis);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("dedup cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = MILLIS_PER_HOUR;

    #[test]
    fn same_second_events_share_a_key() {
        assert_eq!(
            dedup_key("Purchase", "s1", 1700000000123),
            dedup_key("Purchase", "s1", 1700000000987),
        );
        assert_ne!(
            dedup_key("Purchase", "s1", 1700000000123),
            dedup_key("Purchase", "s1", 1700000001001),
        );
        assert_ne!(
            dedup_key("Purchase", "s1", 1700000000123),
            dedup_key("Lead", "s1", 1700000000123),
        );
    }

    #[test]
    fn second_admit_within_the_window_is_rejected() {
        let cache = DedupCache::new(24);
        let key = dedup_key("Purchase", "s1", 1700000000123);

        assert!(cache.admit(&key, 1700000000123));
        assert!(!cache.admit(&key, 1700000000500));
    }

    #[test]
    fn keys_are_admitted_again_after_the_window() {
        let cache = DedupCache::new(24);
        let admitted_at: i64 = 1700000000000;

        assert!(cache.admit("k1", admitted_at));
        assert!(!cache.admit("k1", admitted_at + 23 * HOUR));
        assert!(cache.admit("k1", admitted_at + 24 * HOUR + 1));
    }

    #[test]
    fn sweep_purges_only_expired_entries() {
        let cache = DedupCache::new(1);
        let start: i64 = 1700000000000;

        assert!(cache.admit("old", start));
        assert!(cache.admit("fresh", start + HOUR - 1000));
        assert_eq!(cache.len(), 2);

        let purged = cache.purge_expired(start + HOUR + 1000);
        assert_eq!(purged, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_sessions_never_collide() {
        let cache = DedupCache::new(24);
        let now: i64 = 1700000000000;

        assert!(cache.admit(&dedup_key("Purchase", "s1", now), now));
        assert!(cache.admit(&dedup_key("Purchase", "s2", now), now));
    }
}
