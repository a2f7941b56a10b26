//! Host certificate signing.

use chrono::{DateTime, Duration, Utc};
use ipnet::Ipv4Net;
use std::net::IpAddr;
use zeroize::Zeroizing;

use crate::cert::{CertificateDetails, MeshCertificate};
use crate::keys::HostKeyPair;
use crate::root::{truncate_to_seconds, CaMaterial};
use crate::CaError;

/// A request for a host certificate.
#[derive(Debug, Clone, Default)]
pub struct SignRequest {
    /// Host name.
    pub name: String,
    /// Overlay address with prefix length, e.g. `10.10.10.5/24`.
    pub ip: String,
    /// Lifetime. Unset (or non-positive) expires one second before the CA.
    pub validity: Option<Duration>,
    /// Group memberships.
    pub groups: Vec<String>,
    /// Routable subnets.
    pub subnets: Vec<String>,
}

/// A freshly signed host certificate and its private key.
pub struct SignedCertificate {
    /// The certificate.
    pub certificate: MeshCertificate,
    /// The certificate as PEM.
    pub certificate_pem: String,
    /// The host private key as PEM.
    pub key_pem: Zeroizing<String>,
}

impl SignedCertificate {
    /// Fingerprint of the issued certificate.
    pub fn fingerprint(&self) -> Result<String, CaError> {
        self.certificate.fingerprint()
    }
}

impl std::fmt::Debug for SignedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCertificate")
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

/// Sign a host certificate from PEM-encoded CA material.
pub fn sign_certificate(
    ca_cert_pem: &[u8],
    ca_key_pem: &[u8],
    request: &SignRequest,
) -> Result<SignedCertificate, CaError> {
    let ca = CaMaterial::from_pem(ca_cert_pem, ca_key_pem)?;
    sign_with(&ca, request, Utc::now())
}

/// Sign a host certificate with already-parsed CA material at `now`.
///
/// Nothing is persisted; storing the result is up to the caller.
pub fn sign_with(
    ca: &CaMaterial,
    request: &SignRequest,
    now: DateTime<Utc>,
) -> Result<SignedCertificate, CaError> {
    if request.name.trim().is_empty() {
        return Err(CaError::MissingField("cert name"));
    }
    if request.ip.trim().is_empty() {
        return Err(CaError::MissingField("cert ip"));
    }

    let ca_cert = ca.certificate();
    let issuer = ca_cert.fingerprint()?;

    if ca_cert.is_expired(now) {
        return Err(CaError::Expired);
    }

    let not_before = truncate_to_seconds(now);
    let not_after = match request.validity {
        Some(validity) if validity > Duration::zero() => not_before + validity,
        _ => ca_cert.details.not_after - Duration::seconds(1),
    };
    if not_after <= not_before {
        return Err(CaError::Expired);
    }

    let ip = parse_ipv4_net(request.ip.trim())?;
    let subnets = request
        .subnets
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(parse_ipv4_net)
        .collect::<Result<Vec<_>, _>>()?;

    let groups = request
        .groups
        .iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();

    let keypair = HostKeyPair::generate()?;

    let details = CertificateDetails {
        name: request.name.clone(),
        ips: vec![ip],
        subnets,
        groups,
        not_before,
        not_after,
        public_key: keypair.public_key().to_vec(),
        is_ca: false,
        issuer,
    };

    // Constraints are checked on the unsigned details so a violation never
    // produces a signature.
    let candidate = MeshCertificate {
        details,
        signature: Vec::new(),
    };
    candidate.check_root_constraints(ca_cert)?;

    let certificate = MeshCertificate::sign(candidate.details, ca.key())?;
    let certificate_pem = certificate.to_pem()?;

    Ok(SignedCertificate {
        certificate,
        certificate_pem,
        key_pem: keypair.private_key_pem(),
    })
}

/// Parse an IPv4 CIDR, keeping the host bits.
pub fn parse_ipv4_net(input: &str) -> Result<Ipv4Net, CaError> {
    let (addr, prefix) = input
        .split_once('/')
        .ok_or_else(|| CaError::address(input, "missing prefix length"))?;
    let addr: IpAddr = addr
        .parse()
        .map_err(|e| CaError::address(input, e))?;
    let IpAddr::V4(addr) = addr else {
        return Err(CaError::address(input, "can only be ipv4"));
    };
    let prefix: u8 = prefix.parse().map_err(|e| CaError::address(input, e))?;
    Ipv4Net::new(addr, prefix).map_err(|e| CaError::address(input, e))
}
