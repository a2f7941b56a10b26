//! # west-ca
//!
//! Certificate authority for west mesh networks.
//!
//! ## Architecture
//!
//! ```text
//! NETWORK CA (Ed25519, key encrypted at rest on the coordination node)
//!        │
//!        ├── west-port-1   10.10.10.1/24   (the coordination node itself)
//!        ├── alpha         10.10.10.5/24   (device, X25519 host key)
//!        └── bravo         10.10.10.6/24
//! ```
//!
//! ## Security Model
//!
//! - Every host certificate gets a freshly generated X25519 key; CA key
//!   material is never reused for a host identity
//! - Host certificates never outlive the CA that signed them
//! - Groups, addresses and subnets on a host certificate must sit inside
//!   whatever the CA declares
//! - Signing is pure: persistence is the caller's job
//!
//! ## Example
//!
//! ```rust,ignore
//! use west_ca::{generate_ca, sign_certificate, CaRequest, SignRequest};
//!
//! let ca = generate_ca(&CaRequest { name: "west".into(), ..Default::default() })?;
//! let signed = sign_certificate(
//!     ca.certificate_pem()?.as_bytes(),
//!     ca.key().to_pem().as_bytes(),
//!     &SignRequest { name: "alpha".into(), ip: "10.10.10.5/24".into(), ..Default::default() },
//! )?;
//! ```

mod cert;
mod error;
mod keys;
mod root;
mod sign;

pub use cert::{CertificateDetails, MeshCertificate, CERTIFICATE_LABEL};
pub use error::CaError;
pub use keys::{CaSigningKey, HostKeyPair, CA_KEY_LABEL, HOST_KEY_LABEL, HOST_PUBLIC_KEY_LABEL};
pub use root::{generate_ca, CaMaterial, CaRequest, DEFAULT_CA_DURATION_DAYS};
pub use sign::{parse_ipv4_net, sign_certificate, sign_with, SignRequest, SignedCertificate};

/// Result type for west-ca operations.
pub type Result<T> = std::result::Result<T, CaError>;
