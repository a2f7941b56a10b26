//! Certificate authority material.
//!
//! A west network has exactly one CA. Its key lives encrypted in the
//! coordination node's settings and is only decrypted in memory to sign
//! host certificates.

use chrono::{DateTime, Duration, Utc};
use ipnet::Ipv4Net;

use crate::cert::{CertificateDetails, MeshCertificate};
use crate::keys::CaSigningKey;
use crate::sign::parse_ipv4_net;
use crate::CaError;

/// Default CA lifetime when none is requested.
pub const DEFAULT_CA_DURATION_DAYS: i64 = 365;

/// Parameters for a new CA.
#[derive(Debug, Clone, Default)]
pub struct CaRequest {
    /// CA name.
    pub name: String,
    /// Lifetime. Defaults to [`DEFAULT_CA_DURATION_DAYS`].
    pub duration: Option<Duration>,
    /// Groups hosts may be placed in. Empty means unrestricted.
    pub groups: Vec<String>,
    /// Networks host addresses must fall within. Empty means unrestricted.
    pub ips: Vec<String>,
    /// Networks host subnets must fall within. Empty means unrestricted.
    pub subnets: Vec<String>,
}

/// A CA certificate together with its signing key.
#[derive(Debug)]
pub struct CaMaterial {
    certificate: MeshCertificate,
    key: CaSigningKey,
}

impl CaMaterial {
    /// Pair a certificate with its key, refusing mismatched material.
    pub fn new(certificate: MeshCertificate, key: CaSigningKey) -> Result<Self, CaError> {
        certificate.verify_private_key(&key)?;
        Ok(Self { certificate, key })
    }

    /// Parse PEM-encoded certificate and key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, CaError> {
        if cert_pem.is_empty() {
            return Err(CaError::MissingField("ca crt"));
        }
        if key_pem.is_empty() {
            return Err(CaError::MissingField("ca key"));
        }
        let key = CaSigningKey::from_pem(key_pem)?;
        let certificate = MeshCertificate::from_pem(cert_pem)?;
        Self::new(certificate, key)
    }

    /// The CA certificate.
    pub fn certificate(&self) -> &MeshCertificate {
        &self.certificate
    }

    /// The CA signing key.
    pub fn key(&self) -> &CaSigningKey {
        &self.key
    }

    /// Certificate as PEM.
    pub fn certificate_pem(&self) -> Result<String, CaError> {
        self.certificate.to_pem()
    }

    /// Fingerprint leaf certificates carry as their issuer.
    pub fn fingerprint(&self) -> Result<String, CaError> {
        self.certificate.fingerprint()
    }
}

/// Generate a self-signed CA.
pub fn generate_ca(request: &CaRequest) -> Result<CaMaterial, CaError> {
    generate_ca_at(request, Utc::now())
}

pub(crate) fn generate_ca_at(request: &CaRequest, now: DateTime<Utc>) -> Result<CaMaterial, CaError> {
    if request.name.trim().is_empty() {
        return Err(CaError::MissingField("ca name"));
    }

    let duration = request
        .duration
        .filter(|d| *d > Duration::zero())
        .unwrap_or_else(|| Duration::days(DEFAULT_CA_DURATION_DAYS));

    let ips = parse_nets(&request.ips)?;
    let subnets = parse_nets(&request.subnets)?;
    let groups = request
        .groups
        .iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();

    let key = CaSigningKey::generate()?;
    let not_before = truncate_to_seconds(now);
    let details = CertificateDetails {
        name: request.name.clone(),
        ips,
        subnets,
        groups,
        not_before,
        not_after: not_before + duration,
        public_key: key.public_key().to_vec(),
        is_ca: true,
        issuer: String::new(),
    };

    let certificate = MeshCertificate::sign(details, &key)?;
    Ok(CaMaterial { certificate, key })
}

fn parse_nets(inputs: &[String]) -> Result<Vec<Ipv4Net>, CaError> {
    inputs
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(parse_ipv4_net)
        .collect()
}

pub(crate) fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}
