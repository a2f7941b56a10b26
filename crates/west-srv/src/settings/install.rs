//! First-run setup of the settings record.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use tracing::info;
use west_ca::{parse_ipv4_net, sign_with, CaMaterial, SignRequest};

use super::{Settings, SettingsFile, SETTINGS_VERSION};
use crate::challenge::normalize_name;
use crate::mesh::Cipher;
use crate::secrets::{EncryptionKey, SecretStore};
use crate::SrvError;

/// Overlay network used when none is given.
pub const DEFAULT_CIDR: &str = "10.10.10.0/24";

/// Name on the node's own mesh certificate.
pub const NODE_CERT_NAME: &str = "west-port-1";

/// Parameters for [`install`].
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// Zone the node will be authoritative for.
    pub domain_zone: String,
    /// Overlay network, [`DEFAULT_CIDR`] when unset.
    pub cidr: Option<String>,
    /// ACME contact email.
    pub email: Option<String>,
    /// Mesh cipher suite.
    pub cipher: Cipher,
}

/// Create the settings record.
///
/// Refuses to overwrite an existing record. Signs the node's own certificate
/// at the first host address of the network and seals every secret under a
/// key derived from `passphrase`.
pub async fn install(
    file: &SettingsFile,
    passphrase: &[u8],
    ca: &CaMaterial,
    request: &InstallRequest,
) -> crate::Result<Settings> {
    if file.exists() {
        return Err(SrvError::Settings(format!(
            "already installed, settings present at {}",
            file.path().display()
        )));
    }
    if passphrase.is_empty() {
        return Err(SrvError::Config("encryption passphrase must not be empty".into()));
    }

    let domain_zone = normalize_name(&request.domain_zone);
    if domain_zone.is_empty() {
        return Err(SrvError::Config("domain zone is required".into()));
    }

    let cidr = parse_ipv4_net(request.cidr.as_deref().unwrap_or(DEFAULT_CIDR))?.trunc();
    let node_ip = cidr
        .hosts()
        .next()
        .filter(|_| cidr.prefix_len() < 31)
        .ok_or_else(|| SrvError::Config(format!("network {cidr} has no room for devices")))?;

    let node = sign_with(
        ca,
        &SignRequest {
            name: NODE_CERT_NAME.into(),
            ip: format!("{node_ip}/{}", cidr.prefix_len()),
            ..Default::default()
        },
        Utc::now(),
    )?;

    let salt = EncryptionKey::generate_salt()?;
    let secrets = SecretStore::new(EncryptionKey::derive(passphrase, &salt)?);

    let settings = Settings {
        version: SETTINGS_VERSION,
        key_salt: STANDARD.encode(salt),
        cipher: request.cipher,
        cidr,
        node_ip,
        domain_zone,
        acme_email: request.email.clone().filter(|e| !e.trim().is_empty()),
        ca_crt: secrets.seal(ca.certificate_pem()?.as_bytes())?,
        ca_key: secrets.seal(ca.key().to_pem().as_bytes())?,
        node_crt: secrets.seal(node.certificate_pem.as_bytes())?,
        node_key: secrets.seal(node.key_pem.as_bytes())?,
        acme_account: Default::default(),
        tls_cert: Default::default(),
        tls_key: Default::default(),
        installed_at: Utc::now(),
    };

    file.save(&settings).await?;
    info!(
        zone = %settings.domain_zone,
        cidr = %settings.cidr,
        node_ip = %settings.node_ip,
        fingerprint = %node.fingerprint()?,
        "west port installed"
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use west_ca::{generate_ca, CaRequest};

    fn ca() -> CaMaterial {
        generate_ca(&CaRequest {
            name: "west".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn request() -> InstallRequest {
        InstallRequest {
            domain_zone: "West.Example.com.".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_refuses_reinstall() {
        let dir = tempfile::tempdir().unwrap();
        let file = SettingsFile::new(dir.path().join("settings.json"));
        let ca = ca();

        install(&file, b"pw", &ca, &request()).await.unwrap();
        assert!(matches!(
            install(&file, b"pw", &ca, &request()).await,
            Err(SrvError::Settings(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_cidr() {
        let dir = tempfile::tempdir().unwrap();
        let file = SettingsFile::new(dir.path().join("settings.json"));
        let settings = install(
            &file,
            b"pw",
            &ca(),
            &InstallRequest {
                cidr: Some("172.16.5.9/16".into()),
                cipher: Cipher::ChaChaPoly,
                ..request()
            },
        )
        .await
        .unwrap();

        assert_eq!(settings.cidr.to_string(), "172.16.0.0/16");
        assert_eq!(settings.node_ip.to_string(), "172.16.0.1");
        assert_eq!(settings.domain_zone, "west.example.com");
        assert_eq!(settings.cipher, Cipher::ChaChaPoly);
    }

    #[tokio::test]
    async fn test_validation() {
        let dir = tempfile::tempdir().unwrap();
        let file = SettingsFile::new(dir.path().join("settings.json"));
        let ca = ca();

        assert!(matches!(
            install(&file, b"", &ca, &request()).await,
            Err(SrvError::Config(_))
        ));
        assert!(matches!(
            install(&file, b"pw", &ca, &InstallRequest::default()).await,
            Err(SrvError::Config(_))
        ));
        assert!(matches!(
            install(
                &file,
                b"pw",
                &ca,
                &InstallRequest {
                    cidr: Some("10.0.0.0/32".into()),
                    ..request()
                }
            )
            .await,
            Err(SrvError::Config(_))
        ));
        assert!(matches!(
            install(
                &file,
                b"pw",
                &ca,
                &InstallRequest {
                    cidr: Some("fd00::/64".into()),
                    ..request()
                }
            )
            .await,
            Err(SrvError::Ca(_))
        ));
        assert!(!file.exists());
    }
}
