//! Verification result caching
//!
//! Caching is a pure optimization: callers must treat every cache error as a
//! miss and fall through to full verification. The contract that matters for
//! security is TTL enforcement — an expired entry must behave as a miss,
//! never as a hit, because the trust decision it records (for example a
//! since-revoked keyless certificate) may no longer hold.

pub mod memory;

pub use memory::MemoryVerificationCache;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached verification outcome, keyed by `(digest, policy_hash)`.
///
/// Serializable so persistent cache implementations can store it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Artifact digest the decision applies to
    pub digest: String,
    /// Whether verification succeeded
    pub verified: bool,
    /// Signer identity from the verifying signature (empty in public-key mode)
    pub signer: String,
    /// When the decision was made
    pub timestamp: DateTime<Utc>,
    /// Hash of the policy the decision was made under
    pub policy_hash: String,
    /// How long the decision may be reused
    pub ttl: Duration,
}

impl VerificationResult {
    /// Record a decision made now.
    pub fn new(
        digest: impl Into<String>,
        policy_hash: impl Into<String>,
        verified: bool,
        signer: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        VerificationResult {
            digest: digest.into(),
            verified,
            signer: signer.into(),
            timestamp: Utc::now(),
            policy_hash: policy_hash.into(),
            ttl,
        }
    }

    /// When this entry stops being reusable, if representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.timestamp.checked_add_signed(ttl))
    }

    /// True while `now < timestamp + ttl`. A TTL too large to represent
    /// never expires.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => now < expiry,
            None => true,
        }
    }
}

/// A fresh cache hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedVerification {
    pub verified: bool,
    pub signer: String,
}

/// Pluggable, TTL-bounded store for verification outcomes.
///
/// Binding requirements for every implementation:
/// - TTL expiration is checked before returning a hit; expired entries are
///   misses.
/// - The key is the `(digest, policy_hash)` pair. Neither component may be
///   dropped, or decisions leak across artifacts or across policy changes.
/// - Implementations are safe to call from many tasks concurrently.
///
/// Lazy expiration on read is sufficient; no background sweep is required.
#[async_trait]
pub trait VerificationCache: Send + Sync {
    /// Look up a fresh decision for `(digest, policy_hash)`.
    async fn get_cached_verification(
        &self,
        digest: &str,
        policy_hash: &str,
    ) -> anyhow::Result<Option<CachedVerification>>;

    /// Record a decision, overwriting any previous entry for the same key.
    async fn put_cached_verification(
        &self,
        digest: &str,
        policy_hash: &str,
        verified: bool,
        signer: &str,
        ttl: Duration,
    ) -> anyhow::Result<()>;
}
