//! Load-or-renew orchestration for the node's TLS certificate.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::{AcmeAccount, AcmeError, IssuedCertificate};
use crate::challenge::{normalize_name, ChallengeRegistry};

/// Renew once a certificate is this close to expiry.
pub const DEFAULT_RENEW_BEFORE_DAYS: i64 = 30;

/// Proof providers registered for one issuance.
#[derive(Debug, Clone, Default)]
pub struct ChallengeSolvers {
    /// Path-based provider (token-keyed registry).
    pub http: Option<ChallengeRegistry>,
    /// Name-based provider (FQDN-keyed registry).
    pub dns: Option<ChallengeRegistry>,
}

impl ChallengeSolvers {
    /// True when no provider is registered.
    pub const fn is_empty(&self) -> bool {
        self.http.is_none() && self.dns.is_none()
    }
}

/// The network side of ACME.
#[async_trait]
pub trait AcmeIssuer: Send + Sync {
    /// Register a new account.
    async fn register(&self, email: &str) -> Result<AcmeAccount, AcmeError>;

    /// Prove control of `domain` through `solvers` and obtain a certificate.
    ///
    /// Every challenge presented is cleaned up before returning, success or not.
    async fn obtain(
        &self,
        account: &AcmeAccount,
        domain: &str,
        solvers: &ChallengeSolvers,
    ) -> Result<IssuedCertificate, AcmeError>;
}

/// Where the account and the issued certificate are kept.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// The stored certificate, if any.
    async fn load_certificate(&self) -> Result<Option<IssuedCertificate>, AcmeError>;

    /// Replace the stored certificate.
    async fn save_certificate(&self, certificate: &IssuedCertificate) -> Result<(), AcmeError>;

    /// The stored account, if any.
    async fn load_account(&self) -> Result<Option<AcmeAccount>, AcmeError>;

    /// Store an account.
    async fn save_account(&self, account: &AcmeAccount) -> Result<(), AcmeError>;
}

/// Where a domain's certificate stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateState {
    /// Nothing stored for the domain.
    NoCertificate,
    /// Stored and outside the renewal window.
    Valid {
        /// Leaf expiry.
        not_after: DateTime<Utc>,
    },
    /// Stored but inside the renewal window (or already expired).
    Expiring {
        /// Leaf expiry.
        not_after: DateTime<Utc>,
    },
}

/// Obtains and renews the node's certificate.
///
/// Holds no per-attempt state, so a call interrupted at any point can simply
/// be made again.
pub struct CertificateLifecycleManager {
    issuer: Arc<dyn AcmeIssuer>,
    store: Arc<dyn CertificateStore>,
    solvers: ChallengeSolvers,
    email: String,
    renew_before: Duration,
}

impl CertificateLifecycleManager {
    /// Create a manager registering accounts under `email`.
    pub fn new(
        issuer: Arc<dyn AcmeIssuer>,
        store: Arc<dyn CertificateStore>,
        solvers: ChallengeSolvers,
        email: impl Into<String>,
    ) -> Self {
        Self {
            issuer,
            store,
            solvers,
            email: email.into(),
            renew_before: Duration::days(DEFAULT_RENEW_BEFORE_DAYS),
        }
    }

    /// Override the renewal threshold.
    #[must_use]
    pub const fn with_renew_before(mut self, renew_before: Duration) -> Self {
        self.renew_before = renew_before;
        self
    }

    /// Current state of the stored certificate for `domain`.
    pub async fn status(&self, domain: &str) -> Result<CertificateState, AcmeError> {
        let domain = validate_domain(domain)?;
        let stored = self.store.load_certificate().await?;
        Ok(self.state_of(stored.as_ref(), &domain, Utc::now()))
    }

    /// Return a usable certificate for `domain`, obtaining one if needed.
    ///
    /// With a stored certificate outside the renewal window this performs no
    /// network I/O and returns the stored bytes unchanged.
    pub async fn get_or_obtain(&self, domain: &str) -> Result<IssuedCertificate, AcmeError> {
        let domain = validate_domain(domain)?;
        let stored = self.store.load_certificate().await?;

        match self.state_of(stored.as_ref(), &domain, Utc::now()) {
            CertificateState::Valid { not_after } => {
                info!(domain = %domain, %not_after, "using stored certificate");
                if let Some(certificate) = stored {
                    return Ok(certificate);
                }
            }
            CertificateState::Expiring { not_after } => {
                warn!(domain = %domain, %not_after, "certificate expiring, renewing");
            }
            CertificateState::NoCertificate => {
                info!(domain = %domain, "no certificate stored, obtaining");
            }
        }

        if self.solvers.is_empty() {
            return Err(AcmeError::NoChallengeProvider(domain));
        }

        let account = self.ensure_account().await?;
        let certificate = self.issuer.obtain(&account, &domain, &self.solvers).await?;
        self.store.save_certificate(&certificate).await?;

        info!(
            domain = %domain,
            not_after = %certificate.not_after(),
            "certificate obtained"
        );
        Ok(certificate)
    }

    async fn ensure_account(&self) -> Result<AcmeAccount, AcmeError> {
        if let Some(account) = self.store.load_account().await? {
            return Ok(account);
        }

        if self.email.trim().is_empty() {
            return Err(AcmeError::AccountCreation("no contact email configured".into()));
        }

        info!(email = %self.email, "registering ACME account");
        let account = self.issuer.register(&self.email).await?;
        self.store
            .save_account(&account)
            .await
            .map_err(|e| AcmeError::AccountPersistence(e.to_string()))?;
        info!(registration = %account.registration, "ACME account registered");
        Ok(account)
    }

    fn state_of(
        &self,
        stored: Option<&IssuedCertificate>,
        domain: &str,
        now: DateTime<Utc>,
    ) -> CertificateState {
        match stored {
            Some(cert) if cert.covers(domain) => {
                let not_after = cert.not_after();
                if not_after - now > self.renew_before {
                    CertificateState::Valid { not_after }
                } else {
                    CertificateState::Expiring { not_after }
                }
            }
            _ => CertificateState::NoCertificate,
        }
    }
}

impl std::fmt::Debug for CertificateLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateLifecycleManager")
            .field("email", &self.email)
            .field("renew_before", &self.renew_before)
            .field("solvers", &self.solvers)
            .finish_non_exhaustive()
    }
}

fn validate_domain(domain: &str) -> Result<String, AcmeError> {
    let normalized = normalize_name(domain);
    let valid = !normalized.is_empty()
        && normalized.len() <= 253
        && normalized.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });

    if valid {
        Ok(normalized)
    } else {
        Err(AcmeError::InvalidDomain(domain.to_string()))
    }
}
