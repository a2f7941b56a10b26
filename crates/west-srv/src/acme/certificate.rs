//! Issued certificate bundles and the expiry and name checks run on them.

use chrono::{DateTime, Utc};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};
use zeroize::Zeroizing;

use super::AcmeError;

/// An issued certificate chain and its private key.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    certificate_pem: String,
    private_key_pem: Zeroizing<String>,
    not_after: DateTime<Utc>,
    names: Vec<String>,
}

impl IssuedCertificate {
    /// Parse a PEM chain (leaf first) and its key.
    pub fn from_pem(certificate_pem: String, private_key_pem: Zeroizing<String>) -> Result<Self, AcmeError> {
        if private_key_pem.trim().is_empty() {
            return Err(AcmeError::CertificateParse("missing private key".into()));
        }

        let (_, pem) = x509_parser::pem::parse_x509_pem(certificate_pem.as_bytes())
            .map_err(|e| AcmeError::CertificateParse(format!("invalid PEM: {e}")))?;
        let (_, cert) = X509Certificate::from_der(&pem.contents)
            .map_err(|e| AcmeError::CertificateParse(format!("invalid certificate: {e}")))?;

        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| AcmeError::CertificateParse("invalid expiry timestamp".into()))?;

        let names = cert
            .subject_alternative_name()
            .map_err(|e| AcmeError::CertificateParse(e.to_string()))?
            .map(|san| {
                san.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some(dns.to_ascii_lowercase()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            certificate_pem,
            private_key_pem,
            not_after,
            names,
        })
    }

    /// Certificate chain as PEM.
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    /// Private key as PEM.
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    /// Leaf expiry.
    pub const fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// DNS names on the leaf.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether the leaf names `domain` exactly.
    pub fn covers(&self, domain: &str) -> bool {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        self.names.iter().any(|n| *n == domain)
    }
}

impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("names", &self.names)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}
