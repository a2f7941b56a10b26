//! Error types for west-ca.

use thiserror::Error;

/// Errors raised while generating, parsing, or signing mesh certificates.
#[derive(Error, Debug)]
pub enum CaError {
    /// The CA private key does not belong to the CA certificate.
    #[error("refusing to sign, root certificate does not match private key")]
    AuthorityMismatch,

    /// The CA certificate is outside its validity window.
    #[error("ca certificate is expired")]
    Expired,

    /// An overlay address or subnet is not an IPv4 CIDR.
    #[error("invalid address definition `{input}`: {reason}")]
    AddressFormat {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The requested certificate is not permitted by the signing CA.
    #[error("refusing to sign, root certificate constraints violated: {0}")]
    ConstraintViolation(String),

    /// A required field was empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// PEM or CBOR encoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Signature did not verify against the issuer.
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// Key material is malformed or could not be generated.
    #[error("key error: {0}")]
    Key(String),
}

impl CaError {
    pub(crate) fn address(input: &str, reason: impl ToString) -> Self {
        Self::AddressFormat {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}
