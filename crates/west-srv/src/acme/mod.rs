//! Publicly trusted TLS certificates for the node's zone.
//!
//! # Components
//!
//! - [`CertificateLifecycleManager`] - load-or-renew orchestration, stateless
//!   between calls
//! - [`AcmeIssuer`] - the network side of ACME; [`InstantAcmeIssuer`] talks to
//!   a real directory via `instant-acme`
//! - [`CertificateStore`] - where the account and issued certificate live
//!   (the encrypted settings record in production)
//!
//! # Flow
//!
//! 1. Load the stored certificate; if it covers the domain and is more than
//!    the renewal threshold from expiry, return it with no network I/O
//! 2. Ensure an ACME account exists, registering and persisting one first
//! 3. Order a certificate, present each challenge into the matching
//!    [`crate::challenge::ChallengeRegistry`], and mark it ready
//! 4. Finalize with a fresh key, persist the bundle, clean up challenges
//!
//! Failures are returned, never retried here.

mod account;
mod certificate;
mod client;
mod error;
mod lifecycle;

pub use account::AcmeAccount;
pub use certificate::IssuedCertificate;
pub use client::{install_crypto_provider, InstantAcmeIssuer};
pub use error::AcmeError;
pub use lifecycle::{
    AcmeIssuer, CertificateLifecycleManager, CertificateState, CertificateStore,
    ChallengeSolvers, DEFAULT_RENEW_BEFORE_DAYS,
};
