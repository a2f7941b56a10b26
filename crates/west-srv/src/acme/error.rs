//! ACME error types

use thiserror::Error;

/// Errors that can occur while obtaining or renewing certificates.
#[derive(Debug, Error)]
pub enum AcmeError {
    /// Domain is malformed; rejected before any I/O.
    #[error("invalid domain '{0}'")]
    InvalidDomain(String),

    /// Network or protocol failure during issuance. Not retried.
    #[error("failed to obtain certificate: {0}")]
    ObtainFailed(String),

    /// ACME account registration failed.
    #[error("failed to create ACME account: {0}")]
    AccountCreation(String),

    /// A freshly registered account could not be stored.
    #[error("failed to persist ACME account: {0}")]
    AccountPersistence(String),

    /// No configured proof method is usable for the domain.
    #[error("no challenge provider available for '{0}'")]
    NoChallengeProvider(String),

    /// Issued or stored certificate could not be parsed.
    #[error("failed to parse certificate: {0}")]
    CertificateParse(String),

    /// Certificate store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl AcmeError {
    pub(crate) fn obtain(e: impl std::fmt::Display) -> Self {
        Self::ObtainFailed(e.to_string())
    }
}
