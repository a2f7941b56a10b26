//! The node's persisted settings record.
//!
//! A single JSON document holding network parameters in the clear and every
//! secret sealed with the passphrase-derived key. The salt for that
//! derivation is stored alongside; the key itself never is.

mod install;
mod store;

pub use install::{install, InstallRequest, DEFAULT_CIDR, NODE_CERT_NAME};
pub use store::SettingsCertificateStore;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use west_ca::CaMaterial;
use zeroize::Zeroizing;

use crate::mesh::{Cipher, PkiConfig};
use crate::secrets::{EncryptedField, EncryptionKey, SecretStore};
use crate::SrvError;

/// Current record layout.
pub const SETTINGS_VERSION: u32 = 1;

/// The persisted settings record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Record layout version.
    pub version: u32,
    /// Base64 salt for passphrase key derivation.
    pub key_salt: String,
    /// Mesh cipher suite.
    pub cipher: Cipher,
    /// Overlay network.
    pub cidr: Ipv4Net,
    /// The node's own overlay address.
    pub node_ip: Ipv4Addr,
    /// Zone the node is authoritative for.
    pub domain_zone: String,
    /// ACME contact email.
    #[serde(default)]
    pub acme_email: Option<String>,
    /// CA certificate.
    pub ca_crt: EncryptedField,
    /// CA private key.
    pub ca_key: EncryptedField,
    /// Node certificate.
    pub node_crt: EncryptedField,
    /// Node private key.
    pub node_key: EncryptedField,
    /// Serialized ACME account.
    #[serde(default, skip_serializing_if = "EncryptedField::is_empty")]
    pub acme_account: EncryptedField,
    /// Issued TLS certificate chain.
    #[serde(default, skip_serializing_if = "EncryptedField::is_empty")]
    pub tls_cert: EncryptedField,
    /// Issued TLS private key.
    #[serde(default, skip_serializing_if = "EncryptedField::is_empty")]
    pub tls_key: EncryptedField,
    /// When install ran.
    pub installed_at: DateTime<Utc>,
}

/// Decrypted identity material for the node itself.
pub struct NodeIdentity {
    /// CA certificate PEM.
    pub ca_pem: Zeroizing<String>,
    /// Node certificate PEM.
    pub cert_pem: Zeroizing<String>,
    /// Node private key PEM.
    pub key_pem: Zeroizing<String>,
}

impl NodeIdentity {
    /// As mesh transport PKI configuration.
    pub fn to_pki(&self) -> PkiConfig {
        PkiConfig {
            ca: self.ca_pem.to_string(),
            cert: self.cert_pem.to_string(),
            key: self.key_pem.to_string(),
        }
    }
}

impl Settings {
    /// Derive the process key from `passphrase` and prove it opens this record.
    ///
    /// A wrong passphrase or a corrupt record fails here, before anything
    /// else touches the secrets.
    pub fn unlock(&self, passphrase: &[u8]) -> crate::Result<SecretStore> {
        let salt = STANDARD
            .decode(&self.key_salt)
            .map_err(|e| SrvError::Settings(format!("invalid key salt: {e}")))?;
        let secrets = SecretStore::new(EncryptionKey::derive(passphrase, &salt)?);
        secrets.open(&self.ca_key)?;
        debug!("settings unlocked");
        Ok(secrets)
    }

    /// The CA certificate and key.
    pub fn ca_material(&self, secrets: &SecretStore) -> crate::Result<CaMaterial> {
        let cert = secrets.open(&self.ca_crt)?;
        let key = secrets.open(&self.ca_key)?;
        Ok(CaMaterial::from_pem(&cert, &key)?)
    }

    /// The node's own certificate and key plus the CA certificate.
    pub fn node_identity(&self, secrets: &SecretStore) -> crate::Result<NodeIdentity> {
        Ok(NodeIdentity {
            ca_pem: secrets.open_string(&self.ca_crt)?,
            cert_pem: secrets.open_string(&self.node_crt)?,
            key_pem: secrets.open_string(&self.node_key)?,
        })
    }

    /// The node's overlay address with the network prefix.
    pub fn node_net(&self) -> crate::Result<Ipv4Net> {
        Ipv4Net::new(self.node_ip, self.cidr.prefix_len())
            .map_err(|e| SrvError::Settings(format!("invalid node address: {e}")))
    }
}

/// JSON file holding [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    /// Settings at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a record has been written.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the record. Missing or unparseable is an error.
    pub async fn load(&self) -> crate::Result<Settings> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SrvError::Settings(format!(
                    "no settings at {}, run install first",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| SrvError::Settings(format!("corrupt settings record: {e}")))?;
        if settings.version != SETTINGS_VERSION {
            return Err(SrvError::Settings(format!(
                "unsupported settings version {}",
                settings.version
            )));
        }
        Ok(settings)
    }

    /// Replace the record.
    pub async fn save(&self, settings: &Settings) -> crate::Result<()> {
        let json = serde_json::to_vec_pretty(settings)?;
        write_private(&self.path, &json).await?;
        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

/// Write `contents` to `path` readable only by the owner, via a temp file
/// and rename so readers never see a partial record.
pub(crate) async fn write_private(path: &Path, contents: &[u8]) -> crate::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
