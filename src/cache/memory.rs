//! In-memory reference implementation of the verification cache
//!
//! Entries expire lazily: a read that finds a stale entry removes it and
//! reports a miss. Suitable as a per-process default; persistent caches can
//! implement the same trait over their own storage.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::{CachedVerification, VerificationCache, VerificationResult};

/// Thread-safe in-memory cache keyed by `(digest, policy_hash)`.
#[derive(Default)]
pub struct MemoryVerificationCache {
    entries: RwLock<HashMap<(String, String), VerificationResult>>,
}

impl MemoryVerificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including any not yet reaped.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VerificationCache for MemoryVerificationCache {
    async fn get_cached_verification(
        &self,
        digest: &str,
        policy_hash: &str,
    ) -> anyhow::Result<Option<CachedVerification>> {
        let key = (digest.to_string(), policy_hash.to_string());
        let now = Utc::now();

        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.is_fresh(now) => {
                    return Ok(Some(CachedVerification {
                        verified: entry.verified,
                        signer: entry.signer.clone(),
                    }));
                }
                Some(_) => {
                    debug!(digest, "cache entry expired, reaping");
                }
                None => return Ok(None),
            }
        }

        // Expired entry: upgrade to a write lock and remove it, re-checking
        // freshness in case a writer replaced it in between.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(&key) {
            if entry.is_fresh(now) {
                return Ok(Some(CachedVerification {
                    verified: entry.verified,
                    signer: entry.signer.clone(),
                }));
            }
            entries.remove(&key);
        }
        Ok(None)
    }

    async fn put_cached_verification(
        &self,
        digest: &str,
        policy_hash: &str,
        verified: bool,
        signer: &str,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let entry = VerificationResult::new(digest, policy_hash, verified, signer, ttl);
        let mut entries = self.entries.write().await;
        entries.insert((digest.to_string(), policy_hash.to_string()), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_put_then_get_within_ttl() {
        let cache = MemoryVerificationCache::new();
        cache
            .put_cached_verification("sha256:d1", "h1", true, "alice@example.com", TTL)
            .await
            .unwrap();

        let hit = cache
            .get_cached_verification("sha256:d1", "h1")
            .await
            .unwrap()
            .expect("expected a hit");
        assert!(hit.verified);
        assert_eq!(hit.signer, "alice@example.com");
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_reaped() {
        let cache = MemoryVerificationCache::new();
        cache
            .put_cached_verification("sha256:d1", "h1", true, "alice", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cache.len().await, 1);

        let hit = cache
            .get_cached_verification("sha256:d1", "h1")
            .await
            .unwrap();
        assert!(hit.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_key_includes_digest_and_policy_hash() {
        let cache = MemoryVerificationCache::new();
        cache
            .put_cached_verification("sha256:d1", "h1", true, "alice", TTL)
            .await
            .unwrap();

        assert!(cache
            .get_cached_verification("sha256:d1", "h2")
            .await
            .unwrap()
            .is_none());
        assert!(cache
            .get_cached_verification("sha256:d2", "h1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_entry() {
        let cache = MemoryVerificationCache::new();
        cache
            .put_cached_verification("sha256:d1", "h1", false, "", TTL)
            .await
            .unwrap();
        cache
            .put_cached_verification("sha256:d1", "h1", true, "bob", TTL)
            .await
            .unwrap();

        let hit = cache
            .get_cached_verification("sha256:d1", "h1")
            .await
            .unwrap()
            .unwrap();
        assert!(hit.verified);
        assert_eq!(hit.signer, "bob");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_negative_results_are_stored() {
        let cache = MemoryVerificationCache::new();
        cache
            .put_cached_verification("sha256:d1", "h1", false, "", TTL)
            .await
            .unwrap();

        let hit = cache
            .get_cached_verification("sha256:d1", "h1")
            .await
            .unwrap()
            .unwrap();
        assert!(!hit.verified);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let cache = Arc::new(MemoryVerificationCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let digest = format!("sha256:d{i}");
                cache
                    .put_cached_verification(&digest, "h1", true, "signer", TTL)
                    .await
                    .unwrap();
                cache
                    .get_cached_verification(&digest, "h1")
                    .await
                    .unwrap()
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().verified);
        }
        assert_eq!(cache.len().await, 16);
    }
}
