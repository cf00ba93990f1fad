//! Error types for policy construction and signature verification
//!
//! Verification failures carry structured context (reference, digest, stage)
//! so callers can log and branch on them without parsing message strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::policy::MultiSignatureMode;

/// The stage of the verification pipeline at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// Input validation (malformed digest, empty reference, zero size)
    Validation,
    /// Policy shape validation or policy-level decisions
    Policy,
    /// Fetching signature artifacts from the backend
    Fetch,
    /// Raw signature or certificate-chain cryptography
    Cryptographic,
    /// Signer identity did not match the allowed patterns
    Identity,
    /// Certificate-level checks (issuer, validity)
    Certificate,
    /// Required annotations missing or mismatched
    Annotation,
    /// Transparency-log inclusion proof
    Rekor,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            FailureStage::Validation => "validation",
            FailureStage::Policy => "policy",
            FailureStage::Fetch => "fetch",
            FailureStage::Cryptographic => "cryptographic",
            FailureStage::Identity => "identity",
            FailureStage::Certificate => "certificate",
            FailureStage::Annotation => "annotation",
            FailureStage::Rekor => "rekor",
        };
        f.write_str(tag)
    }
}

/// Errors produced while constructing or validating a [`Policy`](crate::policy::Policy).
#[derive(Error, Debug)]
pub enum PolicyError {
    /// Public keys and keyless configuration are mutually exclusive
    #[error(
        "policy configures both public keys and keyless verification; \
         exactly one trust source must be set"
    )]
    ConflictingTrustSources,

    /// Neither public keys nor any keyless field is configured
    #[error(
        "policy configures no trust source; set public keys or keyless \
         identity/issuer/Rekor options"
    )]
    NoTrustSource,

    /// `MinimumSignatures` must be at least 1 when the minimum mode is used
    #[error("minimum signature count must be at least 1 (got {got})")]
    MinimumTooLow { got: usize },

    /// An identity pattern failed hygiene checks
    #[error("invalid identity pattern {pattern:?}: {reason}")]
    InvalidIdentityPattern { pattern: String, reason: String },

    /// A public key is below the accepted strength floor
    #[error("{kind} key is too weak: {bits} bits (minimum {minimum})")]
    WeakKey {
        kind: &'static str,
        bits: u32,
        minimum: u32,
    },

    /// Rekor verification enabled without a log URL
    #[error("Rekor verification is enabled but no Rekor URL is configured")]
    MissingRekorUrl,
}

/// Errors returned by [`Verifier::verify`](crate::verifier::Verifier::verify).
#[derive(Error, Debug)]
pub enum VerifyError {
    /// The artifact descriptor or reference failed input validation
    #[error("invalid verification input: {reason}")]
    Validation { reason: String },

    /// The policy itself is malformed
    #[error("invalid verification policy: {0}")]
    PolicyConfig(#[from] PolicyError),

    /// No signatures exist for the artifact and the policy enforces signing
    #[error(
        "no signatures found for {reference}@{digest}\n\n\
         The policy is in enforce mode, which requires every artifact to be signed.\n\
         Sign the artifact, or relax the policy to required/optional mode."
    )]
    SignatureNotFound { reference: String, digest: String },

    /// Signatures were present but too few verified to satisfy the policy
    #[error(
        "signature policy not satisfied for {reference}@{digest}: \
         {valid} of {total} signatures verified, {required} required (mode: {mode:?})"
    )]
    PolicyNotSatisfied {
        mode: MultiSignatureMode,
        valid: usize,
        total: usize,
        required: usize,
        reference: String,
        digest: String,
        /// Per-signature rejection reasons gathered during evaluation
        causes: Vec<String>,
    },

    /// A cached negative result was returned without re-verification
    #[error(
        "verification of {reference}@{digest} previously failed under this \
         policy (cached result, re-verification disabled)"
    )]
    CachedRejection { reference: String, digest: String },

    /// The signature fetch itself failed (distinct from "none found")
    #[error("failed to fetch signatures for {reference}@{digest}")]
    Fetch {
        reference: String,
        digest: String,
        #[source]
        source: anyhow::Error,
    },

    /// A stage-tagged verification failure
    #[error("signature verification failed ({stage}) for {reference}@{digest}: {reason}")]
    Rejected {
        stage: FailureStage,
        reference: String,
        digest: String,
        reason: String,
    },
}

impl VerifyError {
    /// The pipeline stage this error is attributed to.
    pub fn stage(&self) -> FailureStage {
        match self {
            VerifyError::Validation { .. } => FailureStage::Validation,
            VerifyError::PolicyConfig(_) => FailureStage::Policy,
            VerifyError::SignatureNotFound { .. } => FailureStage::Fetch,
            VerifyError::PolicyNotSatisfied { .. } => FailureStage::Policy,
            VerifyError::CachedRejection { .. } => FailureStage::Policy,
            VerifyError::Fetch { .. } => FailureStage::Fetch,
            VerifyError::Rejected { stage, .. } => *stage,
        }
    }

    /// Log failures that indicate an active trust problem rather than a
    /// configuration mistake.
    pub fn log_if_security_critical(&self) {
        match self {
            VerifyError::PolicyNotSatisfied { .. }
            | VerifyError::SignatureNotFound { .. }
            | VerifyError::Rejected { .. } => {
                tracing::error!(target: "security", "SIGNATURE VIOLATION: {}", self);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_tags_render_lowercase() {
        assert_eq!(FailureStage::Cryptographic.to_string(), "cryptographic");
        assert_eq!(FailureStage::Rekor.to_string(), "rekor");
    }

    #[test]
    fn policy_not_satisfied_reports_counts() {
        let err = VerifyError::PolicyNotSatisfied {
            mode: MultiSignatureMode::Minimum,
            valid: 1,
            total: 3,
            required: 2,
            reference: "registry.example/app:v1".to_string(),
            digest: "sha256:abc".to_string(),
            causes: vec![],
        };
        let msg = err.to_string();
        assert!(msg.contains("1 of 3"));
        assert!(msg.contains("2 required"));
        assert_eq!(err.stage(), FailureStage::Policy);
    }
}
