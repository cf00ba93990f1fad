//! Verification policy model
//!
//! A `Policy` captures everything that decides whether an artifact's
//! signatures are acceptable: the trust source (public keys or keyless
//! identity constraints), the multi-signature threshold, required
//! annotations, and transparency-log settings. Policies are immutable after
//! construction, which is what makes a `Verifier` safe to share across
//! concurrent callers.

pub mod hash;
pub mod identity;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use crate::error::PolicyError;

/// Default lifetime of cached verification results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Minimum accepted RSA modulus size in bits.
pub const MIN_RSA_BITS: u32 = 2048;

/// Minimum accepted elliptic-curve field size in bits.
pub const MIN_EC_BITS: u32 = 256;

/// How the absence of signatures is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Unsigned artifacts pass; signatures are checked when present
    Optional,
    /// Unsigned artifacts pass; present signatures must satisfy the policy
    Required,
    /// Every artifact must carry at least one satisfying signature
    Enforce,
}

impl Default for VerificationMode {
    fn default() -> Self {
        VerificationMode::Optional
    }
}

/// How multiple signatures on one artifact combine into a single decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiSignatureMode {
    /// At least one signature must verify
    Any,
    /// Every fetched signature must verify
    All,
    /// At least `minimum_signatures` must verify
    Minimum,
}

impl Default for MultiSignatureMode {
    fn default() -> Self {
        MultiSignatureMode::Any
    }
}

/// A trusted public key, validated for strength at construction time.
///
/// Weak keys are rejected here rather than at verification time so they can
/// never enter a policy in the first place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// RSA key; modulus must be at least [`MIN_RSA_BITS`]
    Rsa { der: Vec<u8>, modulus_bits: u32 },
    /// ECDSA key; curve must be at least [`MIN_EC_BITS`]
    Ecdsa { der: Vec<u8>, curve_bits: u32 },
    /// Ed25519 key (fixed 255-bit curve, always acceptable)
    Ed25519 { der: Vec<u8> },
}

impl PublicKey {
    /// Construct an RSA key, rejecting moduli below [`MIN_RSA_BITS`].
    pub fn rsa(der: Vec<u8>, modulus_bits: u32) -> Result<Self, PolicyError> {
        if modulus_bits < MIN_RSA_BITS {
            return Err(PolicyError::WeakKey {
                kind: "RSA",
                bits: modulus_bits,
                minimum: MIN_RSA_BITS,
            });
        }
        Ok(PublicKey::Rsa { der, modulus_bits })
    }

    /// Construct an ECDSA key, rejecting curves below [`MIN_EC_BITS`].
    pub fn ecdsa(der: Vec<u8>, curve_bits: u32) -> Result<Self, PolicyError> {
        if curve_bits < MIN_EC_BITS {
            return Err(PolicyError::WeakKey {
                kind: "ECDSA",
                bits: curve_bits,
                minimum: MIN_EC_BITS,
            });
        }
        Ok(PublicKey::Ecdsa { der, curve_bits })
    }

    /// Construct an Ed25519 key.
    pub fn ed25519(der: Vec<u8>) -> Self {
        PublicKey::Ed25519 { der }
    }

    /// The key's standard DER encoding.
    pub fn der(&self) -> &[u8] {
        match self {
            PublicKey::Rsa { der, .. }
            | PublicKey::Ecdsa { der, .. }
            | PublicKey::Ed25519 { der } => der,
        }
    }

    /// SHA-256 fingerprint of the DER encoding, full 64 hex chars.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.der());
        hex::encode(hasher.finalize())
    }

    /// Algorithm name for logging.
    pub fn algorithm(&self) -> &'static str {
        match self {
            PublicKey::Rsa { .. } => "rsa",
            PublicKey::Ecdsa { .. } => "ecdsa",
            PublicKey::Ed25519 { .. } => "ed25519",
        }
    }
}

/// Immutable signature verification policy.
///
/// Exactly one trust source must be configured: either `public_keys` is
/// non-empty (public-key mode) or at least one keyless field is set
/// (keyless mode). [`Policy::validate`] enforces this.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// How missing signatures are treated
    pub verification_mode: VerificationMode,
    /// How multiple signatures combine
    pub multi_signature_mode: MultiSignatureMode,
    /// Threshold for [`MultiSignatureMode::Minimum`]
    pub minimum_signatures: usize,
    /// Trusted keys (public-key mode only)
    pub public_keys: Vec<PublicKey>,
    /// Glob patterns for acceptable signer identities (keyless mode)
    pub allowed_identities: Vec<String>,
    /// Exact OIDC issuer the signing certificate must name (keyless mode)
    pub required_issuer: Option<String>,
    /// Whether transparency-log inclusion is required (keyless mode)
    pub rekor_enabled: bool,
    /// Rekor log URL
    pub rekor_url: Option<String>,
    /// Annotations every signature must carry with exact values
    pub required_annotations: BTreeMap<String, String>,
    /// Lifetime of cached verification results
    pub cache_ttl: Duration,
}

impl Policy {
    /// True iff this policy verifies via keyless/OIDC certificates rather
    /// than pre-shared public keys.
    pub fn is_keyless_mode(&self) -> bool {
        self.public_keys.is_empty()
    }

    fn keyless_configured(&self) -> bool {
        !self.allowed_identities.is_empty()
            || self.required_issuer.is_some()
            || self.rekor_enabled
            || self.rekor_url.is_some()
    }

    /// Check the policy's structural invariants.
    ///
    /// Exactly one of {public keys, keyless configuration} must be present,
    /// the minimum-signature threshold must be at least 1 when used, every
    /// identity pattern must pass hygiene checks, and Rekor verification
    /// needs a log URL.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let has_keys = !self.public_keys.is_empty();
        let has_keyless = self.keyless_configured();

        if has_keys && has_keyless {
            return Err(PolicyError::ConflictingTrustSources);
        }
        if !has_keys && !has_keyless {
            return Err(PolicyError::NoTrustSource);
        }

        if self.multi_signature_mode == MultiSignatureMode::Minimum && self.minimum_signatures < 1
        {
            return Err(PolicyError::MinimumTooLow {
                got: self.minimum_signatures,
            });
        }

        for pattern in &self.allowed_identities {
            identity::validate_pattern(pattern)?;
        }

        if self.rekor_enabled && self.rekor_url.is_none() {
            return Err(PolicyError::MissingRekorUrl);
        }

        if has_keyless && self.allowed_identities.is_empty() {
            // Deliberate permissive default, surfaced rather than silent:
            // with no patterns configured, any signer identity is accepted.
            warn!(
                "keyless policy has no allowed identities configured; \
                 any signer identity will be accepted"
            );
        }

        Ok(())
    }

    /// True iff the candidate identity is acceptable under this policy.
    ///
    /// Identities over [`identity::MAX_IDENTITY_LEN`] chars or containing
    /// null/control bytes are always rejected. With an empty
    /// `allowed_identities` list, any clean identity is accepted — an
    /// explicit, documented choice (see `Policy::validate`, which warns when
    /// a keyless policy is built this way).
    pub fn matches_identity(&self, candidate: &str) -> bool {
        if !identity::identity_is_clean(candidate) {
            return false;
        }
        if self.allowed_identities.is_empty() {
            return true;
        }
        identity::identity_matches(&self.allowed_identities, candidate)
    }

    /// Check a signature's annotations against the required set.
    ///
    /// Returns the first missing or mismatched annotation as a human-readable
    /// reason, or `Ok(())` when all requirements are met.
    pub fn check_annotations(
        &self,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), String> {
        for (key, expected) in &self.required_annotations {
            match annotations.get(key) {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(format!(
                        "annotation {key:?} has value {actual:?}, expected {expected:?}"
                    ));
                }
                None => {
                    return Err(format!("required annotation {key:?} is missing"));
                }
            }
        }
        Ok(())
    }

    /// The number of valid signatures needed given the fetched total.
    pub fn required_signatures(&self, total: usize) -> usize {
        match self.multi_signature_mode {
            MultiSignatureMode::Any => 1,
            MultiSignatureMode::All => total,
            MultiSignatureMode::Minimum => self.minimum_signatures,
        }
    }
}
