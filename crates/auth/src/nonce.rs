// Path: crates/auth/src/nonce.rs

//! The replay nonce cache: `(sender, nonce)` pairs seen within the replay
//! window. Insertion happens only after a request has fully verified, so a
//! failed authorization cannot burn a nonce.

use bytecave_types::UnixMillis;
use dashmap::DashMap;

/// How long a used nonce stays hot.
pub const NONCE_TTL_MS: i64 = 10 * 60 * 1000;

/// A bounded-by-TTL map of used nonces.
#[derive(Debug, Default)]
pub struct NonceCache {
    used: DashMap<(String, String), UnixMillis>,
}

impl NonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this `(sender, nonce)` pair was used within the window.
    pub fn is_used(&self, sender: &str, nonce: &str, now: UnixMillis) -> bool {
        let key = (sender.to_ascii_lowercase(), nonce.to_string());
        match self.used.get(&key) {
            Some(at) => now - *at <= NONCE_TTL_MS,
            None => false,
        }
    }

    /// Records a nonce as used at `now`.
    pub fn record(&self, sender: &str, nonce: &str, now: UnixMillis) {
        self.used
            .insert((sender.to_ascii_lowercase(), nonce.to_string()), now);
    }

    /// Drops entries older than the replay window. Returns how many were
    /// removed.
    pub fn sweep(&self, now: UnixMillis) -> usize {
        let before = self.used.len();
        self.used.retain(|_, at| now - *at <= NONCE_TTL_MS);
        before - self.used.len()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_use_within_window_is_detected() {
        let cache = NonceCache::new();
        assert!(!cache.is_used("0xAbc", "n1", 0));
        cache.record("0xAbc", "n1", 0);
        // Sender matching is case-insensitive.
        assert!(cache.is_used("0xABC", "n1", 1_000));
        assert!(!cache.is_used("0xabc", "n2", 1_000));
    }

    #[test]
    fn nonce_expires_after_window() {
        let cache = NonceCache::new();
        cache.record("0xabc", "n1", 0);
        assert!(cache.is_used("0xabc", "n1", NONCE_TTL_MS));
        assert!(!cache.is_used("0xabc", "n1", NONCE_TTL_MS + 1));
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let cache = NonceCache::new();
        cache.record("0xabc", "old", 0);
        cache.record("0xabc", "new", NONCE_TTL_MS);
        assert_eq!(cache.sweep(NONCE_TTL_MS + 1), 1);
        assert_eq!(cache.len(), 1);
    }
}
