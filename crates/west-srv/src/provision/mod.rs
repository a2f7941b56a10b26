//! Provisioning tokens.
//!
//! A provisioning token is an HS256 JWT handed to a new device out of band.
//! It carries everything the device needs to bootstrap: the endpoint to
//! redeem at, its assigned overlay address and the network's CA certificate.
//! Redemption signs the device's certificate and records it in the registry.
//!
//! The signing secret is an HKDF subkey of the process encryption key, so
//! tokens stop verifying if the node is reinstalled with a new passphrase.

use chrono::{DateTime, Duration, Utc};
use ipnet::Ipv4Net;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::{debug, info, warn};
use west_ca::{sign_with, CaMaterial, SignRequest};
use zeroize::Zeroizing;

use crate::mesh::Cipher;
use crate::registry::{DeviceRecord, DeviceRegistry};
use crate::secrets::SecretStore;
use crate::settings::Settings;

/// HKDF label for the token signing subkey.
const TOKEN_KEY_LABEL: &[u8] = b"west-provisioning-token";

/// Errors from token issuance and verification.
#[derive(Error, Debug)]
pub enum TokenError {
    /// Signature does not match the node's key.
    #[error("token signature invalid")]
    SignatureInvalid,

    /// Correctly signed but past its expiry.
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),

    /// Not a structurally valid token.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Requested address is not inside the overlay network.
    #[error("address {ip} is outside network {network}")]
    AddressOutsideNetwork {
        /// Rejected address.
        ip: Ipv4Addr,
        /// The overlay network.
        network: Ipv4Net,
    },

    /// Token could not be produced.
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Claims carried by a provisioning token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Where the device redeems the token.
    pub endpoint: String,
    /// Device name.
    pub name: String,
    /// Assigned overlay address with prefix length, e.g. `10.10.10.5/24`.
    pub ip: String,
    /// The coordination node's overlay address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_ip: Option<String>,
    /// CA certificate PEM the device should trust.
    pub ca: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

impl TokenClaims {
    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether the token has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

/// What a device receives on successful redemption.
pub struct DeviceBundle {
    /// CA certificate PEM.
    pub ca: String,
    /// The device's signed certificate PEM.
    pub cert: String,
    /// The device's private key PEM.
    pub key: Zeroizing<String>,
    /// Mesh cipher suite.
    pub cipher: Cipher,
    /// The registered record.
    pub device: DeviceRecord,
}

impl std::fmt::Debug for DeviceBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBundle")
            .field("device", &self.device)
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

/// Issues and verifies provisioning tokens.
pub struct ProvisioningTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl ProvisioningTokenService {
    /// Service keyed from the process secrets.
    pub fn new(secrets: &SecretStore) -> crate::Result<Self> {
        let secret = secrets.key().subkey(TOKEN_KEY_LABEL)?;
        Ok(Self::from_secret(&secret[..]))
    }

    /// Service with an explicit HMAC secret.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Sign a token for `name` at `overlay` (address with prefix length).
    pub fn issue_token(
        &self,
        name: &str,
        overlay: Ipv4Net,
        ca_pem: &str,
        endpoint: &str,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        if name.trim().is_empty() {
            return Err(TokenError::Malformed("device name is required".into()));
        }
        if ttl <= Duration::zero() {
            return Err(TokenError::Signing("token lifetime must be positive".into()));
        }

        let claims = TokenClaims {
            endpoint: endpoint.to_string(),
            name: name.trim().to_string(),
            ip: overlay.to_string(),
            port_ip: None,
            ca: ca_pem.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Issue a token for a device joining the network described by `settings`.
    ///
    /// `ip` must sit inside the network and must not be the network,
    /// broadcast or node address. The token carries the node's own overlay
    /// address as `port_ip`.
    pub fn issue_for_device(
        &self,
        settings: &Settings,
        name: &str,
        ip: Ipv4Addr,
        ca_pem: &str,
        endpoint: &str,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        if ttl <= Duration::zero() {
            return Err(TokenError::Signing("token lifetime must be positive".into()));
        }

        let network = settings.cidr;
        let reserved = [network.network(), network.broadcast(), settings.node_ip];
        if !network.contains(&ip) || reserved.contains(&ip) {
            return Err(TokenError::AddressOutsideNetwork { ip, network });
        }

        let overlay = Ipv4Net::new(ip, network.prefix_len())
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        let claims = TokenClaims {
            endpoint: endpoint.to_string(),
            name: name.trim().to_string(),
            ip: overlay.to_string(),
            port_ip: Some(settings.node_ip.to_string()),
            ca: ca_pem.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        if claims.name.is_empty() {
            return Err(TokenError::Malformed("device name is required".into()));
        }

        let token = self.sign(&claims)?;
        info!(name = %claims.name, ip = %overlay, expires = %claims.expires_at(), "provisioning token issued");
        Ok(token)
    }

    /// Check the signature, then the expiry.
    ///
    /// A token that is correctly signed but stale yields
    /// [`TokenError::Expired`]; anything signed with another key yields
    /// [`TokenError::SignatureInvalid`].
    pub fn verify_signed(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(classify)?
            .claims;

        if claims.is_expired(Utc::now()) {
            return Err(TokenError::Expired(claims.expires_at()));
        }
        Ok(claims)
    }

    /// Redeem a token: sign the device's certificate and register it.
    ///
    /// The registry's uniqueness on name and address is what stops a second
    /// redemption of the same token.
    pub async fn redeem(
        &self,
        token: &str,
        ca: &CaMaterial,
        cipher: Cipher,
        registry: &dyn DeviceRegistry,
    ) -> crate::Result<DeviceBundle> {
        let claims = self.verify_signed(token)?;
        let overlay: Ipv4Net = west_ca::parse_ipv4_net(&claims.ip)?;

        let signed = sign_with(
            ca,
            &SignRequest {
                name: claims.name.clone(),
                ip: claims.ip.clone(),
                ..Default::default()
            },
            Utc::now(),
        )?;
        let fingerprint = signed.fingerprint()?;

        let device = registry
            .create(&claims.name, overlay.addr(), &fingerprint)
            .await
            .inspect_err(|e| warn!(name = %claims.name, error = %e, "token redemption rejected"))?;

        info!(name = %device.name, ip = %device.ip, %fingerprint, "device provisioned");
        Ok(DeviceBundle {
            ca: ca.certificate_pem()?,
            cert: signed.certificate_pem,
            key: signed.key_pem,
            cipher,
            device,
        })
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for ProvisioningTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProvisioningTokenService(<redacted>)")
    }
}

/// Parse a token's claims without checking its signature or expiry.
///
/// For the device side, which cannot verify the node's HMAC; whether to
/// trust the result is the caller's decision.
pub fn verify_unverified(token: &str) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    debug!(name = %data.claims.name, "token parsed without verification");
    Ok(data.claims)
}

fn classify(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::SignatureInvalid,
        _ => TokenError::Malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::secrets::EncryptionKey;
    use crate::SrvError;
    use west_ca::{generate_ca, CaRequest, MeshCertificate};

    fn service(byte: u8) -> ProvisioningTokenService {
        ProvisioningTokenService::new(&SecretStore::new(EncryptionKey::from_bytes([byte; 32])))
            .unwrap()
    }

    fn ca() -> CaMaterial {
        generate_ca(&CaRequest {
            name: "west".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn overlay(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let svc = service(1);
        let token = svc
            .issue_token("alpha", overlay("10.10.10.5/24"), "CA", "https://api.west.example.com", Duration::hours(1))
            .unwrap();

        let claims = svc.verify_signed(&token).unwrap();
        assert_eq!(claims.name, "alpha");
        assert_eq!(claims.ip, "10.10.10.5/24");
        assert_eq!(claims.ca, "CA");
        assert_eq!(claims.endpoint, "https://api.west.example.com");
        assert!(claims.expires_at() > Utc::now());
    }

    #[test]
    fn test_expired_is_distinct_from_forged() {
        let svc = service(1);
        let stale = svc
            .sign(&TokenClaims {
                endpoint: "e".into(),
                name: "alpha".into(),
                ip: "10.10.10.5/24".into(),
                port_ip: None,
                ca: "CA".into(),
                exp: (Utc::now() - Duration::minutes(5)).timestamp(),
            })
            .unwrap();
        assert!(matches!(svc.verify_signed(&stale), Err(TokenError::Expired(_))));

        let fresh = svc
            .issue_token("alpha", overlay("10.10.10.5/24"), "CA", "e", Duration::hours(1))
            .unwrap();
        assert!(matches!(
            service(2).verify_signed(&fresh),
            Err(TokenError::SignatureInvalid)
        ));
        assert!(matches!(
            service(2).verify_signed(&stale),
            Err(TokenError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_unverified_parse() {
        let token = service(1)
            .issue_token("alpha", overlay("10.10.10.5/24"), "CA", "e", Duration::hours(1))
            .unwrap();
        let claims = verify_unverified(&token).unwrap();
        assert_eq!(claims.name, "alpha");

        assert!(matches!(verify_unverified("not.a.token"), Err(TokenError::Malformed(_))));
        assert!(matches!(service(1).verify_signed("garbage"), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_issue_validation() {
        let svc = service(1);
        assert!(svc
            .issue_token(" ", overlay("10.10.10.5/24"), "CA", "e", Duration::hours(1))
            .is_err());
        assert!(svc
            .issue_token("alpha", overlay("10.10.10.5/24"), "CA", "e", Duration::zero())
            .is_err());
    }

    #[tokio::test]
    async fn test_issue_for_device_checks_network() {
        let dir = tempfile::tempdir().unwrap();
        let (_, settings) = crate::settings::tests::installed(dir.path()).await;
        let svc = service(1);

        let token = svc
            .issue_for_device(&settings, "alpha", Ipv4Addr::new(10, 10, 10, 5), "CA", "e", Duration::hours(1))
            .unwrap();
        let claims = svc.verify_signed(&token).unwrap();
        assert_eq!(claims.ip, "10.10.10.5/24");
        assert_eq!(claims.port_ip.as_deref(), Some("10.10.10.1"));

        for ip in [
            Ipv4Addr::new(10, 10, 11, 5),
            Ipv4Addr::new(10, 10, 10, 0),
            Ipv4Addr::new(10, 10, 10, 1),
            Ipv4Addr::new(10, 10, 10, 255),
        ] {
            assert!(
                matches!(
                    svc.issue_for_device(&settings, "alpha", ip, "CA", "e", Duration::hours(1)),
                    Err(TokenError::AddressOutsideNetwork { .. })
                ),
                "{ip} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_issue_for_device_rejects_non_positive_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let (_, settings) = crate::settings::tests::installed(dir.path()).await;
        let svc = service(1);
        let ip = Ipv4Addr::new(10, 10, 10, 5);

        for ttl in [Duration::zero(), Duration::hours(-1)] {
            assert!(matches!(
                svc.issue_for_device(&settings, "alpha", ip, "CA", "e", ttl),
                Err(TokenError::Signing(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_redeem_registers_device_once() {
        let svc = service(1);
        let ca = ca();
        let registry = MemoryRegistry::new();
        let token = svc
            .issue_token(
                "alpha",
                overlay("10.10.10.5/24"),
                &ca.certificate_pem().unwrap(),
                "e",
                Duration::hours(1),
            )
            .unwrap();

        let bundle = svc.redeem(&token, &ca, Cipher::Aes, &registry).await.unwrap();
        assert_eq!(bundle.device.ip, Ipv4Addr::new(10, 10, 10, 5));
        assert!(bundle.key.contains("WEST X25519 PRIVATE KEY"));

        let cert = MeshCertificate::from_pem(bundle.cert.as_bytes()).unwrap();
        assert_eq!(cert.fingerprint().unwrap(), bundle.device.fingerprint);
        assert!(cert.verify(ca.certificate(), Utc::now()).is_ok());

        let found = registry.find_by_name("alpha").await.unwrap().unwrap();
        assert_eq!(found, bundle.device);

        assert!(matches!(
            svc.redeem(&token, &ca, Cipher::Aes, &registry).await,
            Err(SrvError::Registry(_))
        ));
    }

    #[tokio::test]
    async fn test_redeem_rejects_forged() {
        let ca = ca();
        let registry = MemoryRegistry::new();
        let token = service(2)
            .issue_token("mallory", overlay("10.10.10.9/24"), "CA", "e", Duration::hours(1))
            .unwrap();

        assert!(matches!(
            service(1).redeem(&token, &ca, Cipher::Aes, &registry).await,
            Err(SrvError::Token(TokenError::SignatureInvalid))
        ));
        assert!(registry.is_empty().await);
    }
}
