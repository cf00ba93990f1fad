//! Deterministic policy hashing
//!
//! The policy hash keys cached verification results: two policies that would
//! reach different verification decisions must hash differently, and the same
//! policy must hash identically regardless of field insertion order. Every
//! verification-relevant field is fed into a single SHA-256 in a fixed,
//! canonical order with length-prefixed framing so adjacent fields can never
//! alias each other.

use sha2::{Digest, Sha256};

use crate::policy::{MultiSignatureMode, Policy, VerificationMode};

/// Sentinel hash for the absence of a policy.
pub const NULL_POLICY_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Number of hex chars kept by [`policy_hash_short`].
const SHORT_HASH_LEN: usize = 16;

fn feed(hasher: &mut Sha256, label: &str, value: &[u8]) {
    hasher.update(label.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
}

/// Compute the canonical hash of a policy as 64 hex chars.
///
/// `None` hashes to [`NULL_POLICY_HASH`]. Identical policies hash
/// identically regardless of the order keys, identities, or annotations were
/// inserted; any change to a verification-relevant field changes the hash.
pub fn compute_policy_hash(policy: Option<&Policy>) -> String {
    let Some(policy) = policy else {
        return NULL_POLICY_HASH.to_string();
    };

    let mut hasher = Sha256::new();
    hasher.update(b"CACHET_POLICY_V1");

    let mode = match policy.verification_mode {
        VerificationMode::Optional => "optional",
        VerificationMode::Required => "required",
        VerificationMode::Enforce => "enforce",
    };
    feed(&mut hasher, "mode", mode.as_bytes());

    let multi = match policy.multi_signature_mode {
        MultiSignatureMode::Any => "any",
        MultiSignatureMode::All => "all",
        MultiSignatureMode::Minimum => "minimum",
    };
    feed(&mut hasher, "multisig", multi.as_bytes());
    feed(
        &mut hasher,
        "min",
        policy.minimum_signatures.to_string().as_bytes(),
    );

    // Key fingerprints, sorted so insertion order is irrelevant
    let mut fingerprints: Vec<String> =
        policy.public_keys.iter().map(|k| k.fingerprint()).collect();
    fingerprints.sort();
    for fp in &fingerprints {
        feed(&mut hasher, "key", fp.as_bytes());
    }

    let mut identities: Vec<&str> = policy
        .allowed_identities
        .iter()
        .map(String::as_str)
        .collect();
    identities.sort();
    for identity in &identities {
        feed(&mut hasher, "identity", identity.as_bytes());
    }

    feed(
        &mut hasher,
        "issuer",
        policy
            .required_issuer
            .as_deref()
            .unwrap_or_default()
            .as_bytes(),
    );

    // BTreeMap iteration is already key-sorted
    for (key, value) in &policy.required_annotations {
        feed(&mut hasher, "annotation-key", key.as_bytes());
        feed(&mut hasher, "annotation-value", value.as_bytes());
    }

    feed(
        &mut hasher,
        "rekor",
        if policy.rekor_enabled { b"true" } else { b"false" },
    );
    feed(
        &mut hasher,
        "rekor-url",
        policy.rekor_url.as_deref().unwrap_or_default().as_bytes(),
    );

    hex::encode(hasher.finalize())
}

/// Truncate a policy hash for log lines. Never use the short form as a key.
pub fn policy_hash_short(hash: &str) -> &str {
    if hash.len() <= SHORT_HASH_LEN {
        hash
    } else {
        &hash[..SHORT_HASH_LEN]
    }
}

/// True iff two policy hashes differ (full-length comparison).
pub fn policy_changed(old: &str, new: &str) -> bool {
    old != new
}

/// Combine several policy hashes into one deterministic hash.
///
/// Hashes are sorted before concatenation, so the result is independent of
/// argument order. Reserved for multi-policy cache keying.
pub fn merge_policy_hashes(hashes: &[String]) -> String {
    let mut sorted: Vec<&str> = hashes.iter().map(String::as_str).collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    hasher.update(b"CACHET_POLICY_MERGE_V1");
    for hash in sorted {
        feed(&mut hasher, "hash", hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PublicKey;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn base_policy() -> Policy {
        let mut annotations = BTreeMap::new();
        annotations.insert("env".to_string(), "prod".to_string());
        annotations.insert("team".to_string(), "infra".to_string());
        Policy {
            verification_mode: VerificationMode::Enforce,
            allowed_identities: vec![
                "*@example.com".to_string(),
                "ci@corp.io".to_string(),
            ],
            required_issuer: Some("https://accounts.example.com".to_string()),
            required_annotations: annotations,
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let policy = base_policy();
        assert_eq!(
            compute_policy_hash(Some(&policy)),
            compute_policy_hash(Some(&policy))
        );
    }

    #[test]
    fn test_hash_is_order_independent() {
        let a = base_policy();
        let mut b = base_policy();
        b.allowed_identities.reverse();

        let mut annotations = BTreeMap::new();
        annotations.insert("team".to_string(), "infra".to_string());
        annotations.insert("env".to_string(), "prod".to_string());
        b.required_annotations = annotations;

        assert_eq!(compute_policy_hash(Some(&a)), compute_policy_hash(Some(&b)));
    }

    #[test]
    fn test_key_order_is_irrelevant() {
        let k1 = PublicKey::ed25519(vec![1]);
        let k2 = PublicKey::ed25519(vec![2]);

        let a = Policy {
            public_keys: vec![k1.clone(), k2.clone()],
            ..Default::default()
        };
        let b = Policy {
            public_keys: vec![k2, k1],
            ..Default::default()
        };
        assert_eq!(compute_policy_hash(Some(&a)), compute_policy_hash(Some(&b)));
    }

    #[test]
    fn test_every_relevant_field_changes_hash() {
        let base = compute_policy_hash(Some(&base_policy()));

        let mut p = base_policy();
        p.verification_mode = VerificationMode::Optional;
        assert_ne!(base, compute_policy_hash(Some(&p)));

        let mut p = base_policy();
        p.multi_signature_mode = MultiSignatureMode::All;
        assert_ne!(base, compute_policy_hash(Some(&p)));

        let mut p = base_policy();
        p.minimum_signatures = 2;
        assert_ne!(base, compute_policy_hash(Some(&p)));

        let mut p = base_policy();
        p.allowed_identities.push("extra@example.org".to_string());
        assert_ne!(base, compute_policy_hash(Some(&p)));

        let mut p = base_policy();
        p.required_issuer = Some("https://other.example.com".to_string());
        assert_ne!(base, compute_policy_hash(Some(&p)));

        let mut p = base_policy();
        p.required_annotations
            .insert("env".to_string(), "staging".to_string());
        assert_ne!(base, compute_policy_hash(Some(&p)));

        let mut p = base_policy();
        p.rekor_enabled = true;
        p.rekor_url = Some("https://rekor.example.com".to_string());
        assert_ne!(base, compute_policy_hash(Some(&p)));
    }

    #[test]
    fn test_nil_policy_sentinel() {
        assert_eq!(compute_policy_hash(None), NULL_POLICY_HASH);
        assert_eq!(NULL_POLICY_HASH.len(), 64);
    }

    #[test]
    fn test_short_hash() {
        let hash = compute_policy_hash(Some(&base_policy()));
        assert_eq!(policy_hash_short(&hash).len(), 16);
        assert!(hash.starts_with(policy_hash_short(&hash)));
        assert_eq!(policy_hash_short("abc"), "abc");
    }

    #[test]
    fn test_policy_changed() {
        let a = compute_policy_hash(Some(&base_policy()));
        let mut other = base_policy();
        other.rekor_enabled = true;
        other.rekor_url = Some("https://rekor.example.com".to_string());
        let b = compute_policy_hash(Some(&other));

        assert!(!policy_changed(&a, &a));
        assert!(policy_changed(&a, &b));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let h1 = compute_policy_hash(Some(&base_policy()));
        let h2 = NULL_POLICY_HASH.to_string();

        let forward = merge_policy_hashes(&[h1.clone(), h2.clone()]);
        let reverse = merge_policy_hashes(&[h2, h1]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), 64);
    }
}
