//! Verification orchestration
//!
//! The verifier ties the policy model, the cache, and the signing backend
//! together: validate input, consult the cache, fetch signatures, verify each
//! one through the backend, evaluate the multi-signature threshold, and
//! record the outcome. It holds only an immutable policy and handles to its
//! collaborators, so one instance serves unlimited concurrent callers with no
//! internal locking.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{ArtifactDescriptor, BackendError, SignatureArtifact, SigningBackend};
use crate::cache::VerificationCache;
use crate::error::{FailureStage, VerifyError};
use crate::policy::hash::{compute_policy_hash, policy_hash_short};
use crate::policy::{MultiSignatureMode, Policy, PublicKey, VerificationMode, DEFAULT_CACHE_TTL};

/// The result of a successful `verify` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// Whether signatures were actually verified. False when an unsigned
    /// artifact passed under optional/required mode.
    pub verified: bool,
    /// Identity of the first verifying keyless signer; empty in public-key
    /// mode or when unverified.
    pub signer: String,
    /// Whether the decision came from the cache.
    pub from_cache: bool,
}

/// Policy-driven signature verifier.
///
/// Construct via [`Verifier::builder`]. The policy is validated and hashed
/// once at build time and never mutated afterwards.
pub struct Verifier {
    policy: Policy,
    policy_hash: String,
    backend: Arc<dyn SigningBackend>,
    cache: Option<Arc<dyn VerificationCache>>,
    trust_cached_failures: bool,
}

/// Builder covering the full configuration surface of a [`Verifier`].
pub struct VerifierBuilder {
    policy: Policy,
    backend: Arc<dyn SigningBackend>,
    cache: Option<Arc<dyn VerificationCache>>,
    trust_cached_failures: bool,
}

impl VerifierBuilder {
    /// Unsigned artifacts pass; signatures are checked when present.
    pub fn optional_mode(mut self) -> Self {
        self.policy.verification_mode = VerificationMode::Optional;
        self
    }

    /// Unsigned artifacts pass; present signatures must satisfy the policy.
    pub fn required_mode(mut self) -> Self {
        self.policy.verification_mode = VerificationMode::Required;
        self
    }

    /// Every artifact must carry at least one satisfying signature.
    pub fn enforce_mode(mut self) -> Self {
        self.policy.verification_mode = VerificationMode::Enforce;
        self
    }

    /// Require every fetched signature to verify (`true`), or any one
    /// (`false`, the default).
    pub fn require_all(mut self, all: bool) -> Self {
        self.policy.multi_signature_mode = if all {
            MultiSignatureMode::All
        } else {
            MultiSignatureMode::Any
        };
        self
    }

    /// Require at least `n` signatures to verify.
    pub fn minimum_signatures(mut self, n: usize) -> Self {
        self.policy.multi_signature_mode = MultiSignatureMode::Minimum;
        self.policy.minimum_signatures = n;
        self
    }

    /// Glob patterns for acceptable signer identities (keyless mode).
    pub fn allowed_identities<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy.allowed_identities = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Exact OIDC issuer signing certificates must name (keyless mode).
    pub fn required_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.policy.required_issuer = Some(issuer.into());
        self
    }

    /// Annotations every signature must carry with exact values.
    pub fn required_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.policy.required_annotations = annotations;
        self
    }

    /// Enable or disable transparency-log corroboration.
    pub fn rekor(mut self, enabled: bool) -> Self {
        self.policy.rekor_enabled = enabled;
        self
    }

    /// Rekor log URL. No default; Rekor verification without a URL fails
    /// policy validation.
    pub fn rekor_url(mut self, url: impl Into<String>) -> Self {
        self.policy.rekor_url = Some(url.into());
        self
    }

    /// Trusted public keys (public-key mode).
    pub fn public_keys(mut self, keys: Vec<PublicKey>) -> Self {
        self.policy.public_keys = keys;
        self
    }

    /// Lifetime of cached verification results.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.policy.cache_ttl = ttl;
        self
    }

    /// Attach a verification cache.
    pub fn cache(mut self, cache: Arc<dyn VerificationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Whether a fresh cached `verified=false` entry is authoritative.
    ///
    /// Default `false`: cached negatives trigger full re-verification so the
    /// caller gets a fresh, detailed error. Set `true` to short-circuit to
    /// [`VerifyError::CachedRejection`] instead.
    pub fn trust_cached_failures(mut self, trust: bool) -> Self {
        self.trust_cached_failures = trust;
        self
    }

    /// Validate the policy and build the verifier.
    pub fn build(self) -> Result<Verifier, VerifyError> {
        self.policy.validate()?;
        let policy_hash = compute_policy_hash(Some(&self.policy));
        debug!(
            backend = self.backend.name(),
            policy = policy_hash_short(&policy_hash),
            "built verifier"
        );
        Ok(Verifier {
            policy: self.policy,
            policy_hash,
            backend: self.backend,
            cache: self.cache,
            trust_cached_failures: self.trust_cached_failures,
        })
    }
}

impl Verifier {
    /// Start building a verifier over the given signing backend.
    pub fn builder(backend: Arc<dyn SigningBackend>) -> VerifierBuilder {
        VerifierBuilder {
            policy: Policy {
                cache_ttl: DEFAULT_CACHE_TTL,
                ..Default::default()
            },
            backend,
            cache: None,
            trust_cached_failures: false,
        }
    }

    /// The policy this verifier enforces.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Canonical hash of the policy, as used in cache keys.
    pub fn policy_hash(&self) -> &str {
        &self.policy_hash
    }

    /// Verify the signatures attached to an artifact.
    ///
    /// Terminal on the first error. On success the outcome says whether
    /// signatures were actually checked (`verified`) and which signer
    /// identity vouched for the artifact, if any.
    pub async fn verify(
        &self,
        artifact: &ArtifactDescriptor,
        reference: &str,
    ) -> Result<VerificationOutcome, VerifyError> {
        let result = self.verify_inner(artifact, reference).await;
        if let Err(e) = &result {
            e.log_if_security_critical();
        }
        result
    }

    async fn verify_inner(
        &self,
        artifact: &ArtifactDescriptor,
        reference: &str,
    ) -> Result<VerificationOutcome, VerifyError> {
        // Step 1: input validation
        validate_input(artifact, reference)?;
        let digest = artifact.digest.as_str();

        // Step 2: policy validation (cheap; the policy is immutable but the
        // check keeps verify self-contained)
        self.policy.validate()?;

        // Step 3: cache lookup
        if let Some(hit) = self.cache_lookup(digest).await {
            if hit.verified {
                debug!(
                    digest,
                    policy = policy_hash_short(&self.policy_hash),
                    "verification cache hit"
                );
                return Ok(VerificationOutcome {
                    verified: true,
                    signer: hit.signer,
                    from_cache: true,
                });
            }
            if self.trust_cached_failures {
                return Err(VerifyError::CachedRejection {
                    reference: reference.to_string(),
                    digest: digest.to_string(),
                });
            }
            debug!(digest, "cached negative result, re-verifying for fresh diagnostics");
        }

        // Step 4: fetch signatures
        let signatures = match self.backend.fetch_signatures(reference, digest).await {
            Ok(signatures) => signatures,
            Err(BackendError::NotFound) => Vec::new(),
            Err(e) => {
                return Err(VerifyError::Fetch {
                    reference: reference.to_string(),
                    digest: digest.to_string(),
                    source: e.into(),
                })
            }
        };

        // Step 5: missing-signature policy
        if signatures.is_empty() {
            return match self.policy.verification_mode {
                VerificationMode::Enforce => {
                    self.cache_write(digest, false, "").await;
                    Err(VerifyError::SignatureNotFound {
                        reference: reference.to_string(),
                        digest: digest.to_string(),
                    })
                }
                VerificationMode::Optional | VerificationMode::Required => {
                    info!(digest, "artifact is unsigned; policy does not mandate signing");
                    Ok(VerificationOutcome {
                        verified: false,
                        signer: String::new(),
                        from_cache: false,
                    })
                }
            };
        }

        // Steps 6-7: per-signature verification and threshold evaluation
        let total = signatures.len();
        let required = self.policy.required_signatures(total);
        let mut valid = 0usize;
        let mut signer = String::new();
        let mut causes = Vec::new();

        for (index, signature) in signatures.iter().enumerate() {
            match self.verify_single(signature, digest).await {
                Ok(identity) => {
                    valid += 1;
                    if signer.is_empty() && !identity.is_empty() {
                        signer = identity;
                    }
                    // Any mode needs exactly one valid signature; skip the rest
                    if self.policy.multi_signature_mode == MultiSignatureMode::Any {
                        debug!(digest, index, "signature verified, short-circuiting");
                        break;
                    }
                }
                Err(reason) => {
                    debug!(digest, index, %reason, "signature rejected");
                    causes.push(format!("signature {index}: {reason}"));
                }
            }
        }

        let satisfied = match self.policy.multi_signature_mode {
            MultiSignatureMode::Any => valid >= 1,
            MultiSignatureMode::All => valid == total,
            MultiSignatureMode::Minimum => valid >= required,
        };

        if !satisfied {
            // Step 9: failure path
            self.cache_write(digest, false, "").await;
            return Err(VerifyError::PolicyNotSatisfied {
                mode: self.policy.multi_signature_mode,
                valid,
                total,
                required,
                reference: reference.to_string(),
                digest: digest.to_string(),
                causes,
            });
        }

        // Step 8: success path
        info!(
            digest,
            valid,
            total,
            signer = signer.as_str(),
            "signature verification succeeded"
        );
        self.cache_write(digest, true, &signer).await;
        Ok(VerificationOutcome {
            verified: true,
            signer,
            from_cache: false,
        })
    }

    /// Verify one signature end to end. Returns the signer identity on
    /// success (empty in public-key mode) or a stage-tagged reason on
    /// rejection.
    async fn verify_single(
        &self,
        signature: &SignatureArtifact,
        digest: &str,
    ) -> Result<String, String> {
        if let Err(reason) = self.policy.check_annotations(&signature.annotations) {
            return Err(format!("{}: {reason}", FailureStage::Annotation));
        }

        if !self.policy.is_keyless_mode() {
            let matched = self
                .backend
                .verify_public_key(signature, digest, &self.policy.public_keys)
                .await
                .map_err(|e| stage_reason(e, FailureStage::Cryptographic))?;
            debug!(
                algorithm = matched.algorithm(),
                fingerprint = policy_hash_short(&matched.fingerprint()),
                "signature matched trusted key"
            );
            // Public-key signatures carry no signer identity
            return Ok(String::new());
        }

        let attestation = self
            .backend
            .verify_keyless(signature, digest, &self.policy)
            .await
            .map_err(|e| stage_reason(e, FailureStage::Certificate))?;

        if !self.policy.matches_identity(&attestation.identity) {
            return Err(format!(
                "{}: signer {:?} does not match any allowed identity",
                FailureStage::Identity,
                attestation.identity
            ));
        }

        if let Some(required) = &self.policy.required_issuer {
            if &attestation.issuer != required {
                return Err(format!(
                    "{}: certificate issuer {:?} does not match required issuer {:?}",
                    FailureStage::Certificate,
                    attestation.issuer,
                    required
                ));
            }
        }

        if self.policy.rekor_enabled {
            let url = self.policy.rekor_url.as_deref().unwrap_or_default();
            self.backend
                .verify_rekor_inclusion(signature, url)
                .await
                .map_err(|e| stage_reason(e, FailureStage::Rekor))?;
        }

        Ok(attestation.identity)
    }

    /// Cache read; any error is a miss.
    async fn cache_lookup(&self, digest: &str) -> Option<crate::cache::CachedVerification> {
        let cache = self.cache.as_ref()?;
        match cache
            .get_cached_verification(digest, &self.policy_hash)
            .await
        {
            Ok(hit) => hit,
            Err(e) => {
                warn!(digest, "cache read failed, treating as miss: {e:#}");
                None
            }
        }
    }

    /// Best-effort cache write; failures are logged and swallowed.
    async fn cache_write(&self, digest: &str, verified: bool, signer: &str) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if let Err(e) = cache
            .put_cached_verification(
                digest,
                &self.policy_hash,
                verified,
                signer,
                self.policy.cache_ttl,
            )
            .await
        {
            warn!(digest, verified, "cache write failed: {e:#}");
        }
    }
}

/// Attribute a backend error to a pipeline stage, defaulting opaque errors
/// to the stage of the operation that produced them.
fn stage_reason(error: BackendError, default_stage: FailureStage) -> String {
    match error {
        BackendError::Rejected { stage, reason } => format!("{stage}: {reason}"),
        other => format!("{default_stage}: {other}"),
    }
}

/// Step-1 input validation: digest shape, positive size, non-empty reference.
fn validate_input(artifact: &ArtifactDescriptor, reference: &str) -> Result<(), VerifyError> {
    if reference.is_empty() {
        return Err(VerifyError::Validation {
            reason: "artifact reference is empty".to_string(),
        });
    }
    if artifact.size == 0 {
        return Err(VerifyError::Validation {
            reason: "artifact size must be positive".to_string(),
        });
    }
    validate_digest(&artifact.digest)
}

fn validate_digest(digest: &str) -> Result<(), VerifyError> {
    if digest.is_empty() {
        return Err(VerifyError::Validation {
            reason: "artifact digest is empty".to_string(),
        });
    }
    let Some((algorithm, hex_part)) = digest.split_once(':') else {
        return Err(VerifyError::Validation {
            reason: format!("digest {digest:?} is not in algorithm:hex form"),
        });
    };
    if algorithm.is_empty()
        || !algorithm
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'+' || b == b'.' || b == b'_')
    {
        return Err(VerifyError::Validation {
            reason: format!("digest algorithm {algorithm:?} is invalid"),
        });
    }
    if hex_part.is_empty() || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(VerifyError::Validation {
            reason: format!("digest {digest:?} has a non-hex payload"),
        });
    }
    if algorithm == "sha256" && hex_part.len() != 64 {
        return Err(VerifyError::Validation {
            reason: format!(
                "sha256 digest must be 64 hex chars, got {}",
                hex_part.len()
            ),
        });
    }
    Ok(())
}
