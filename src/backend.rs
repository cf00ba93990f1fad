//! Signing backend seam - abstraction over the cryptographic collaborator
//!
//! The verifier never touches raw cryptography or the network itself. All of
//! that lives behind [`SigningBackend`]: fetching signature artifacts from a
//! registry, certificate-chain validation, raw signature math, and
//! transparency-log lookups. This keeps the orchestration layer deterministic
//! and easy to test against a mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::FailureStage;
use crate::policy::{Policy, PublicKey};

/// Descriptor for a content-addressed artifact, as supplied by the
/// registry/content-store collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Content digest in `algorithm:hex` form
    pub digest: String,
    /// Media type of the artifact
    pub media_type: String,
    /// Size in bytes; must be positive
    pub size: u64,
}

impl ArtifactDescriptor {
    pub fn new(
        digest: impl Into<String>,
        media_type: impl Into<String>,
        size: u64,
    ) -> Self {
        ArtifactDescriptor {
            digest: digest.into(),
            media_type: media_type.into(),
            size,
        }
    }
}

/// A signature object attached to an artifact.
#[derive(Debug, Clone, Default)]
pub struct SignatureArtifact {
    /// Digest of the signature object itself
    pub digest: String,
    /// The signed payload
    pub payload: Vec<u8>,
    /// Raw signature bytes
    pub signature: Vec<u8>,
    /// Annotations attached to the signature
    pub annotations: BTreeMap<String, String>,
    /// PEM-encoded signing certificate (keyless signatures)
    pub certificate_pem: Option<String>,
    /// Opaque transparency-log bundle, when the signer uploaded one
    pub rekor_bundle: Option<serde_json::Value>,
}

/// Identity material extracted from a cryptographically validated keyless
/// certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeylessAttestation {
    /// Signer identity (certificate SAN)
    pub identity: String,
    /// OIDC issuer that vouched for the identity
    pub issuer: String,
}

/// Errors surfaced by a signing backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// No signature artifacts exist for the queried artifact.
    /// Distinct from transport failure; the verifier's missing-signature
    /// policy applies only to this variant.
    #[error("no signature artifacts found")]
    NotFound,

    /// A signature failed a cryptographic or certificate check
    #[error("signature rejected ({stage}): {reason}")]
    Rejected {
        stage: FailureStage,
        reason: String,
    },

    /// Transport or internal backend failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The cryptographic and transport collaborator.
///
/// Every method can block on the network. Implementations must do their work
/// inside the returned future so the caller's cancellation (dropping the
/// future, or an enclosing `tokio::time::timeout`) takes effect; spawning
/// detached background work that outlives the call is a defect.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// Fetch all signature objects attached to `(reference, digest)`.
    ///
    /// Returns [`BackendError::NotFound`] when the artifact has no
    /// signatures at all.
    async fn fetch_signatures(
        &self,
        reference: &str,
        digest: &str,
    ) -> Result<Vec<SignatureArtifact>, BackendError>;

    /// Verify one signature against a set of candidate public keys,
    /// returning the key that matched.
    async fn verify_public_key(
        &self,
        signature: &SignatureArtifact,
        digest: &str,
        candidate_keys: &[PublicKey],
    ) -> Result<PublicKey, BackendError>;

    /// Validate a keyless signature's certificate chain and signature math,
    /// returning the attested signer identity and issuer.
    ///
    /// Identity/issuer/annotation policy checks are the verifier's job; the
    /// backend only establishes what the certificate cryptographically says.
    async fn verify_keyless(
        &self,
        signature: &SignatureArtifact,
        digest: &str,
        policy: &Policy,
    ) -> Result<KeylessAttestation, BackendError>;

    /// Verify the signature's inclusion proof against the given Rekor log.
    async fn verify_rekor_inclusion(
        &self,
        signature: &SignatureArtifact,
        rekor_url: &str,
    ) -> Result<(), BackendError>;

    /// Backend identifier for logging
    fn name(&self) -> &'static str;
}
