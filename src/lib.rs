//! Cachet library exports
//!
//! Policy-driven signature verification for content-addressed artifacts:
//! build a [`Policy`] through [`Verifier::builder`], attach an optional
//! [`VerificationCache`], and call [`Verifier::verify`] before trusting an
//! artifact. Cryptography and transport live behind the [`SigningBackend`]
//! seam.

pub mod backend;
pub mod cache;
pub mod error;
pub mod policy;
pub mod verifier;

pub use backend::{
    ArtifactDescriptor, BackendError, KeylessAttestation, SignatureArtifact, SigningBackend,
};
pub use cache::{CachedVerification, MemoryVerificationCache, VerificationCache, VerificationResult};
pub use error::{FailureStage, PolicyError, VerifyError};
pub use policy::hash::{
    compute_policy_hash, merge_policy_hashes, policy_changed, policy_hash_short, NULL_POLICY_HASH,
};
pub use policy::{MultiSignatureMode, Policy, PublicKey, VerificationMode, DEFAULT_CACHE_TTL};
pub use verifier::{VerificationOutcome, Verifier, VerifierBuilder};
