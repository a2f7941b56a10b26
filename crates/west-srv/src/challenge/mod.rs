//! Pending proof-of-control state.
//!
//! Two independent registries back the two ways of proving domain control:
//!
//! - [`ChallengeKind::Token`]: keyed by challenge token, the value is the raw
//!   key authorization served over HTTP (see [`http`]).
//! - [`ChallengeKind::Fqdn`]: keyed by `_acme-challenge.<domain>`, the value
//!   is the digest served as a TXT record by the authoritative resolver.
//!
//! Nothing is persisted. A restart mid-issuance starts over from zero.

pub mod http;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::digest::{digest, SHA256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Label prepended to a domain for its DNS-01 TXT record.
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// How a registry keys its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// Path-based proof, keyed by token.
    Token,
    /// Name-based proof, keyed by normalized FQDN.
    Fqdn,
}

/// In-memory pending proofs guarded by a reader/writer lock.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone)]
pub struct ChallengeRegistry {
    kind: ChallengeKind,
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl ChallengeRegistry {
    /// Create an empty registry.
    pub fn new(kind: ChallengeKind) -> Self {
        Self {
            kind,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry for path-based proofs.
    pub fn tokens() -> Self {
        Self::new(ChallengeKind::Token)
    }

    /// Registry for name-based proofs.
    pub fn fqdns() -> Self {
        Self::new(ChallengeKind::Fqdn)
    }

    /// Which kind of proof this registry holds.
    pub const fn kind(&self) -> ChallengeKind {
        self.kind
    }

    /// Record a pending proof.
    pub fn present(&self, domain: &str, token: &str, key_auth: &str) {
        let (key, value) = match self.kind {
            ChallengeKind::Token => (token.to_string(), key_auth.to_string()),
            ChallengeKind::Fqdn => (dns01_fqdn(domain), dns01_value(key_auth)),
        };

        info!(domain, kind = ?self.kind, key = %key, "challenge presented");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    /// Remove a pending proof. Removing an absent entry is not an error.
    pub fn clean_up(&self, domain: &str, token: &str, _key_auth: &str) {
        let key = match self.kind {
            ChallengeKind::Token => token.to_string(),
            ChallengeKind::Fqdn => dns01_fqdn(domain),
        };

        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .is_some();
        debug!(domain, kind = ?self.kind, key = %key, removed, "challenge cleaned up");
    }

    /// Find the stored value. Never removes the entry.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let key = match self.kind {
            ChallengeKind::Token => key.to_string(),
            ChallengeKind::Fqdn => normalize_name(key),
        };
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Number of pending proofs.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercase a DNS name and strip the trailing root dot.
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// TXT record name for a domain's DNS-01 challenge. Wildcards share the base name.
pub fn dns01_fqdn(domain: &str) -> String {
    let domain = normalize_name(domain);
    let domain = domain.strip_prefix("*.").unwrap_or(&domain);
    format!("{ACME_CHALLENGE_LABEL}.{domain}")
}

/// TXT record value for a DNS-01 key authorization.
pub fn dns01_value(key_auth: &str) -> String {
    URL_SAFE_NO_PAD.encode(digest(&SHA256, key_auth.as_bytes()))
}
