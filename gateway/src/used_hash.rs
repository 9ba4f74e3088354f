//! Process-local TTL set of spent L402 payment hashes.
//!
//! Every read or write may trigger a sweep if enough wall-clock time has
//! passed since the last one, and a background task runs the same sweep at
//! the same cadence so an idle process still reclaims memory.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

pub const DEFAULT_TTL_SECONDS: u64 = 3600;
pub const DEFAULT_CLEANUP_INTERVAL_SECONDS: u64 = 300;

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct UsedHashStats {
    pub entries: usize,
}

struct Inner {
    entries: HashMap<String, Instant>,
    last_cleanup: Instant,
}

/// Concurrent-safe, TTL-swept set of spent payment hashes.
pub struct UsedHashSet {
    ttl: Duration,
    cleanup_interval: Duration,
    inner: Mutex<Inner>,
}

impl UsedHashSet {
    pub fn new(ttl_seconds: u64, cleanup_interval_seconds: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds),
            cleanup_interval: Duration::from_secs(cleanup_interval_seconds),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    pub fn is_used(&self, hash: &str) -> bool {
        let mut guard = self.inner.lock().expect("used-hash mutex poisoned");
        self.maybe_cleanup(&mut guard);
        guard.entries.contains_key(hash)
    }

    /// Put-if-absent: returns `true` if this call claimed the hash, `false`
    /// if it was already present. This is the idempotency fence for
    /// concurrent L402 redemptions of the same hash.
    pub fn mark_used(&self, hash: &str) -> bool {
        let mut guard = self.inner.lock().expect("used-hash mutex poisoned");
        self.maybe_cleanup(&mut guard);
        if guard.entries.contains_key(hash) {
            return false;
        }
        guard.entries.insert(hash.to_string(), Instant::now());
        true
    }

    pub fn cleanup(&self) {
        let mut guard = self.inner.lock().expect("used-hash mutex poisoned");
        self.cleanup_locked(&mut guard);
    }

    pub fn stats(&self) -> UsedHashStats {
        let guard = self.inner.lock().expect("used-hash mutex poisoned");
        UsedHashStats { entries: guard.entries.len() }
    }

    fn maybe_cleanup(&self, guard: &mut Inner) {
        if guard.last_cleanup.elapsed() >= self.cleanup_interval {
            self.cleanup_locked(guard);
        }
    }

    fn cleanup_locked(&self, guard: &mut Inner) {
        let ttl = self.ttl;
        guard.entries.retain(|_, inserted_at| inserted_at.elapsed() < ttl);
        guard.last_cleanup = Instant::now();
    }
}

impl Default for UsedHashSet {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECONDS, DEFAULT_CLEANUP_INTERVAL_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_used_is_put_if_absent() {
        let set = UsedHashSet::default();
        assert!(set.mark_used("abc"));
        assert!(!set.mark_used("abc"));
        assert!(set.is_used("abc"));
    }

    #[test]
    fn cleanup_drops_expired_entries() {
        let set = UsedHashSet::new(0, 300);
        assert!(set.mark_used("abc"));
        std::thread::sleep(Duration::from_millis(5));
        set.cleanup();
        assert_eq!(set.stats().entries, 0);
        assert!(!set.is_used("abc"));
    }
}
