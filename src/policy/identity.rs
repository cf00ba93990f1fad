//! Hardened glob matching of signer identities
//!
//! Identities arrive from certificate extensions, which means an attacker who
//! compromises an issuer controls the string we match against. Both patterns
//! (at policy construction) and candidate identities (at match time) go through
//! the same hygiene checks before any glob comparison happens.

use glob::{MatchOptions, Pattern};
use tracing::debug;

use crate::error::PolicyError;

/// Maximum accepted length for an allowed-identity pattern.
pub const MAX_PATTERN_LEN: usize = 256;

/// Maximum accepted length for a candidate identity string.
pub const MAX_IDENTITY_LEN: usize = 512;

fn contains_forbidden_bytes(s: &str) -> bool {
    s.bytes().any(|b| b == 0 || b.is_ascii_control())
}

/// Check a candidate identity for injection hazards.
///
/// Returns false for identities that are empty, longer than
/// [`MAX_IDENTITY_LEN`], or contain null/control bytes. Such identities never
/// match any pattern.
pub(crate) fn identity_is_clean(identity: &str) -> bool {
    if identity.is_empty() || identity.len() > MAX_IDENTITY_LEN {
        return false;
    }
    !contains_forbidden_bytes(identity)
}

/// Validate an allowed-identity pattern at policy-construction time.
pub(crate) fn validate_pattern(pattern: &str) -> Result<(), PolicyError> {
    if pattern.is_empty() {
        return Err(PolicyError::InvalidIdentityPattern {
            pattern: pattern.to_string(),
            reason: "pattern is empty".to_string(),
        });
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(PolicyError::InvalidIdentityPattern {
            pattern: pattern.to_string(),
            reason: format!("pattern exceeds {MAX_PATTERN_LEN} characters"),
        });
    }
    if contains_forbidden_bytes(pattern) {
        return Err(PolicyError::InvalidIdentityPattern {
            pattern: pattern.to_string(),
            reason: "pattern contains null or control bytes".to_string(),
        });
    }
    // Every brace alternative must compile as a glob
    for alternative in expand_braces(pattern) {
        if let Err(e) = Pattern::new(&alternative) {
            return Err(PolicyError::InvalidIdentityPattern {
                pattern: pattern.to_string(),
                reason: format!("invalid glob syntax: {e}"),
            });
        }
    }
    Ok(())
}

/// True iff the identity matches at least one of the given patterns.
///
/// Patterns support `*`, `?`, character classes, and brace alternation
/// (`{a,b}` expands before glob compilation). The candidate identity is
/// re-validated here even though patterns were vetted at construction time.
pub(crate) fn identity_matches(patterns: &[String], identity: &str) -> bool {
    if !identity_is_clean(identity) {
        debug!("rejecting identity failing hygiene checks (len={})", identity.len());
        return false;
    }

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    for pattern in patterns {
        for alternative in expand_braces(pattern) {
            match Pattern::new(&alternative) {
                Ok(glob) => {
                    if glob.matches_with(identity, options) {
                        return true;
                    }
                }
                Err(e) => {
                    // Vetted at construction; a failure here means the policy
                    // was built without validation. Treat as non-match.
                    debug!("skipping uncompilable pattern {:?}: {}", alternative, e);
                }
            }
        }
    }
    false
}

/// Expand the first balanced `{a,b,c}` group and recurse on the results.
///
/// A pattern without braces (or with unbalanced ones) is returned as-is.
fn expand_braces(pattern: &str) -> Vec<String> {
    let bytes = pattern.as_bytes();
    let mut open = None;
    let mut depth = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth == 0 {
                    // Unbalanced close, treat the whole pattern literally
                    return vec![pattern.to_string()];
                }
                depth -= 1;
                if depth == 0 {
                    let start = open.unwrap();
                    let prefix = &pattern[..start];
                    let body = &pattern[start + 1..i];
                    let suffix = &pattern[i + 1..];

                    let mut expanded = Vec::new();
                    for alt in split_alternatives(body) {
                        let candidate = format!("{prefix}{alt}{suffix}");
                        expanded.extend(expand_braces(&candidate));
                    }
                    return expanded;
                }
            }
            _ => {}
        }
    }

    vec![pattern.to_string()]
}

/// Split a brace body on top-level commas, preserving nested groups.
fn split_alternatives(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, b) in body.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}
