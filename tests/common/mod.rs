//! Shared test fixtures: a scripted signing backend with call counters

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use cachet::{
    ArtifactDescriptor, BackendError, FailureStage, KeylessAttestation, Policy, PublicKey,
    SignatureArtifact, SigningBackend,
};

pub const DIGEST: &str = "sha256:4355a46b19d348dc2f57c046f8ef63d4538ebb936000f3c9ee954a27460dd865";
pub const OTHER_DIGEST: &str =
    "sha256:53c234e5e8472b6ac51c1ae1cab3fe06fad053beb8ebfd8977b010655bfdd3c3";
pub const REFERENCE: &str = "registry.example/payments/api:2.4.1";

pub fn descriptor() -> ArtifactDescriptor {
    ArtifactDescriptor::new(DIGEST, "application/vnd.oci.image.manifest.v1+json", 2048)
}

/// What the backend should report for one signature.
#[derive(Clone)]
pub enum Scripted {
    Valid { identity: String, issuer: String },
    Invalid(String),
}

impl Scripted {
    pub fn valid(identity: &str) -> Self {
        Scripted::Valid {
            identity: identity.to_string(),
            issuer: "https://token.actions.example.com".to_string(),
        }
    }

    pub fn invalid(reason: &str) -> Self {
        Scripted::Invalid(reason.to_string())
    }
}

/// Backend whose per-signature outcomes are fixed up front.
pub struct ScriptedBackend {
    signatures: Vec<SignatureArtifact>,
    outcomes: HashMap<String, Scripted>,
    pub rekor_ok: bool,
    pub fetch_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub rekor_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn unsigned() -> Self {
        Self::new(vec![])
    }

    pub fn new(outcomes: Vec<Scripted>) -> Self {
        Self::with_annotations(
            outcomes
                .into_iter()
                .map(|o| (o, BTreeMap::new()))
                .collect(),
        )
    }

    /// Build signatures carrying specific annotations.
    pub fn with_annotations(outcomes: Vec<(Scripted, BTreeMap<String, String>)>) -> Self {
        let mut signatures = Vec::new();
        let mut map = HashMap::new();
        for (i, (outcome, annotations)) in outcomes.into_iter().enumerate() {
            let digest = format!("sha256:signature-{i}");
            signatures.push(SignatureArtifact {
                digest: digest.clone(),
                annotations,
                ..Default::default()
            });
            map.insert(digest, outcome);
        }
        ScriptedBackend {
            signatures,
            outcomes: map,
            rekor_ok: true,
            fetch_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            rekor_calls: AtomicUsize::new(0),
        }
    }

    fn outcome_for(&self, signature: &SignatureArtifact) -> Scripted {
        self.outcomes
            .get(&signature.digest)
            .cloned()
            .unwrap_or_else(|| Scripted::invalid("unknown signature"))
    }
}

#[async_trait]
impl SigningBackend for ScriptedBackend {
    async fn fetch_signatures(
        &self,
        _reference: &str,
        _digest: &str,
    ) -> Result<Vec<SignatureArtifact>, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.signatures.is_empty() {
            return Err(BackendError::NotFound);
        }
        Ok(self.signatures.clone())
    }

    async fn verify_public_key(
        &self,
        signature: &SignatureArtifact,
        _digest: &str,
        candidate_keys: &[PublicKey],
    ) -> Result<PublicKey, BackendError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome_for(signature) {
            Scripted::Valid { .. } => Ok(candidate_keys[0].clone()),
            Scripted::Invalid(reason) => Err(BackendError::Rejected {
                stage: FailureStage::Cryptographic,
                reason,
            }),
        }
    }

    async fn verify_keyless(
        &self,
        signature: &SignatureArtifact,
        _digest: &str,
        _policy: &Policy,
    ) -> Result<KeylessAttestation, BackendError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome_for(signature) {
            Scripted::Valid { identity, issuer } => Ok(KeylessAttestation { identity, issuer }),
            Scripted::Invalid(reason) => Err(BackendError::Rejected {
                stage: FailureStage::Cryptographic,
                reason,
            }),
        }
    }

    async fn verify_rekor_inclusion(
        &self,
        _signature: &SignatureArtifact,
        _rekor_url: &str,
    ) -> Result<(), BackendError> {
        self.rekor_calls.fetch_add(1, Ordering::SeqCst);
        if self.rekor_ok {
            Ok(())
        } else {
            Err(BackendError::Rejected {
                stage: FailureStage::Rekor,
                reason: "entry not found in transparency log".to_string(),
            })
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
