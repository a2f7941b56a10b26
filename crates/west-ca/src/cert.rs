//! Mesh certificate format.
//!
//! A certificate is a CBOR-encoded [`CertificateDetails`] plus an Ed25519
//! signature over that encoding, wrapped in a `WEST CERTIFICATE` PEM block.
//! The fingerprint is the hex SHA-256 of the full encoded certificate and is
//! what leaf certificates carry as their `issuer`.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use ipnet::Ipv4Net;
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};

use crate::keys::{decode_pem, CaSigningKey};
use crate::CaError;

/// PEM label for certificates.
pub const CERTIFICATE_LABEL: &str = "WEST CERTIFICATE";

/// The signed portion of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDetails {
    /// Host or CA name.
    pub name: String,
    /// Overlay addresses, each carrying the network prefix length.
    pub ips: Vec<Ipv4Net>,
    /// Subnets this host may route for.
    #[serde(default)]
    pub subnets: Vec<Ipv4Net>,
    /// Group memberships used by mesh firewall rules.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Not valid before (second precision).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub not_before: DateTime<Utc>,
    /// Not valid after (second precision).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub not_after: DateTime<Utc>,
    /// Ed25519 key for CAs, X25519 key for hosts.
    pub public_key: Vec<u8>,
    /// Whether this certificate may sign others.
    pub is_ca: bool,
    /// Fingerprint of the signing CA. Empty for self-signed roots.
    #[serde(default)]
    pub issuer: String,
}

/// A signed mesh certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshCertificate {
    /// Signed fields.
    pub details: CertificateDetails,
    /// Ed25519 signature over the CBOR encoding of `details`.
    pub signature: Vec<u8>,
}

impl MeshCertificate {
    /// Sign `details` with a CA key.
    pub fn sign(details: CertificateDetails, key: &CaSigningKey) -> Result<Self, CaError> {
        let message = to_cbor(&details)?;
        let signature = key.sign(&message).to_vec();
        Ok(Self { details, signature })
    }

    /// CBOR encoding of the whole certificate.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CaError> {
        to_cbor(self)
    }

    /// Decode a certificate from its CBOR encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CaError> {
        ciborium::from_reader(bytes)
            .map_err(|e| CaError::Encoding(format!("invalid certificate body: {e}")))
    }

    /// PEM encoding.
    pub fn to_pem(&self) -> Result<String, CaError> {
        Ok(pem::encode(&pem::Pem::new(
            CERTIFICATE_LABEL,
            self.to_bytes()?,
        )))
    }

    /// Parse a PEM-encoded certificate.
    pub fn from_pem(input: &[u8]) -> Result<Self, CaError> {
        let body = decode_pem(input, CERTIFICATE_LABEL)?;
        Self::from_bytes(&body)
    }

    /// Hex SHA-256 of the encoded certificate.
    pub fn fingerprint(&self) -> Result<String, CaError> {
        let bytes = self.to_bytes()?;
        Ok(hex::encode(digest(&SHA256, &bytes)))
    }

    /// True if `now` falls outside the validity window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now < self.details.not_before || now > self.details.not_after
    }

    /// Check the signature against an Ed25519 public key.
    pub fn check_signature(&self, public_key: &[u8]) -> Result<(), CaError> {
        let key_bytes: [u8; 32] = public_key
            .try_into()
            .map_err(|_| CaError::Signature("issuer key is not an ed25519 key".into()))?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| CaError::Signature(e.to_string()))?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|e| CaError::Signature(e.to_string()))?;
        let message = to_cbor(&self.details)?;
        key.verify(&message, &signature)
            .map_err(|e| CaError::Signature(e.to_string()))
    }

    /// Confirm `key` is the private half of this certificate's public key.
    pub fn verify_private_key(&self, key: &CaSigningKey) -> Result<(), CaError> {
        if !self.details.is_ca || self.details.public_key != key.public_key() {
            return Err(CaError::AuthorityMismatch);
        }
        Ok(())
    }

    /// Full verification of a leaf against its CA at `now`.
    pub fn verify(&self, ca: &Self, now: DateTime<Utc>) -> Result<(), CaError> {
        if ca.is_expired(now) {
            return Err(CaError::Expired);
        }
        if self.is_expired(now) {
            return Err(CaError::ConstraintViolation(format!(
                "certificate `{}` is outside its validity window",
                self.details.name
            )));
        }
        if self.details.issuer != ca.fingerprint()? {
            return Err(CaError::Signature(
                "certificate was not issued by this ca".into(),
            ));
        }
        self.check_signature(&ca.details.public_key)?;
        self.check_root_constraints(ca)
    }

    /// Ensure this certificate stays within everything `signer` permits.
    pub fn check_root_constraints(&self, signer: &Self) -> Result<(), CaError> {
        let leaf = &self.details;
        let root = &signer.details;

        if root.not_after < leaf.not_after {
            return Err(CaError::ConstraintViolation(
                "certificate expires after signing certificate".into(),
            ));
        }
        if root.not_before > leaf.not_before {
            return Err(CaError::ConstraintViolation(
                "certificate is valid before the signing certificate".into(),
            ));
        }

        if !root.groups.is_empty() {
            if let Some(group) = leaf.groups.iter().find(|g| !root.groups.contains(g)) {
                return Err(CaError::ConstraintViolation(format!(
                    "certificate contained a group not present on the signing ca: {group}"
                )));
            }
        }

        if !root.ips.is_empty() {
            if let Some(ip) = leaf.ips.iter().find(|ip| !net_match(ip, &root.ips)) {
                return Err(CaError::ConstraintViolation(format!(
                    "certificate contained an ip assignment outside the limitations of the signing ca: {ip}"
                )));
            }
        }

        if !root.subnets.is_empty() {
            if let Some(subnet) = leaf.subnets.iter().find(|s| !net_match(s, &root.subnets)) {
                return Err(CaError::ConstraintViolation(format!(
                    "certificate contained a subnet assignment outside the limitations of the signing ca: {subnet}"
                )));
            }
        }

        Ok(())
    }
}

fn net_match(candidate: &Ipv4Net, allowed: &[Ipv4Net]) -> bool {
    allowed.iter().any(|net| net.contains(candidate))
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CaError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| CaError::Encoding(format!("cbor encode: {e}")))?;
    Ok(buf)
}
