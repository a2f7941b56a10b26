//! Mesh transport configuration.
//!
//! The transport engine itself is an external collaborator. This module
//! builds the configuration it consumes from the node's signed identity and
//! defines the start/stop seam the node runtime drives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

mod file;

pub use file::ConfigFileTransport;

/// Tunnel cipher suite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cipher {
    /// AES-256-GCM.
    #[default]
    Aes,
    /// ChaCha20-Poly1305.
    ChaChaPoly,
}

impl std::str::FromStr for Cipher {
    type Err = crate::SrvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes" => Ok(Self::Aes),
            "chachapoly" => Ok(Self::ChaChaPoly),
            other => Err(crate::SrvError::Config(format!(
                "unknown cipher '{other}', expected aes or chachapoly"
            ))),
        }
    }
}

impl std::fmt::Display for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Aes => "aes",
            Self::ChaChaPoly => "chachapoly",
        })
    }
}

/// PEM material the transport authenticates with.
#[derive(Clone, Serialize, Deserialize)]
pub struct PkiConfig {
    /// Trusted CA certificate(s).
    pub ca: String,
    /// This host's certificate.
    pub cert: String,
    /// This host's private key.
    pub key: String,
}

impl std::fmt::Debug for PkiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkiConfig").finish_non_exhaustive()
    }
}

/// Where the transport listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Bind host.
    pub host: String,
    /// UDP port.
    pub port: u16,
}

/// Lighthouse role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LighthouseConfig {
    /// Whether this host answers peer discovery.
    pub am_lighthouse: bool,
}

/// Tunnel device settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunConfig {
    /// Run without a tunnel device.
    pub disabled: bool,
}

/// Configuration document consumed by the mesh transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Identity material.
    pub pki: PkiConfig,
    /// Overlay address to underlay endpoints.
    #[serde(default)]
    pub static_host_map: BTreeMap<String, Vec<String>>,
    /// Lighthouse role.
    pub lighthouse: LighthouseConfig,
    /// Listener.
    pub listen: ListenConfig,
    /// Tunnel device.
    pub tun: TunConfig,
    /// Cipher suite.
    pub cipher: Cipher,
}

impl MeshConfig {
    /// Configuration for the coordination node: lighthouse, no tunnel device.
    pub fn for_node(pki: PkiConfig, listen: SocketAddr, cipher: Cipher) -> Self {
        Self {
            pki,
            static_host_map: BTreeMap::new(),
            lighthouse: LighthouseConfig {
                am_lighthouse: true,
            },
            listen: ListenConfig {
                host: listen.ip().to_string(),
                port: listen.port(),
            },
            tun: TunConfig { disabled: true },
            cipher,
        }
    }

    /// Add a static peer.
    #[must_use]
    pub fn with_static_host(mut self, overlay: impl Into<String>, endpoints: Vec<String>) -> Self {
        self.static_host_map.insert(overlay.into(), endpoints);
        self
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> crate::Result<String> {
        serde_yaml::to_string(self).map_err(|e| crate::SrvError::Mesh(format!("yaml: {e}")))
    }
}

/// Called once the transport is up.
pub type OnStarted = Box<dyn FnOnce() + Send>;

/// A mesh transport engine.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Run until `shutdown` is cancelled, calling `on_started` once listening.
    async fn start(
        &self,
        config: MeshConfig,
        on_started: OnStarted,
        shutdown: CancellationToken,
    ) -> crate::Result<()>;

    /// Ask a running transport to stop.
    async fn stop(&self) -> crate::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pki() -> PkiConfig {
        PkiConfig {
            ca: "-----BEGIN WEST CERTIFICATE-----".into(),
            cert: "cert".into(),
            key: "secret-key".into(),
        }
    }

    #[test]
    fn test_node_config_yaml() {
        let config = MeshConfig::for_node(pki(), "[::]:4242".parse().unwrap(), Cipher::ChaChaPoly)
            .with_static_host("10.10.10.1", vec!["203.0.113.7:4242".into()]);
        let yaml = config.to_yaml().unwrap();

        assert!(yaml.contains("am_lighthouse: true"));
        assert!(yaml.contains("disabled: true"));
        assert!(yaml.contains("cipher: chachapoly"));
        assert!(yaml.contains("port: 4242"));
        assert!(yaml.contains("203.0.113.7:4242"));

        let parsed: MeshConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.listen.host, "::");
        assert_eq!(parsed.cipher, Cipher::ChaChaPoly);
    }

    #[test]
    fn test_cipher_parse() {
        assert_eq!("AES".parse::<Cipher>().unwrap(), Cipher::Aes);
        assert_eq!("chachapoly".parse::<Cipher>().unwrap(), Cipher::ChaChaPoly);
        assert!("des".parse::<Cipher>().is_err());
        assert_eq!(Cipher::ChaChaPoly.to_string(), "chachapoly");
    }

    #[test]
    fn test_pki_debug_hides_key() {
        assert!(!format!("{:?}", pki()).contains("secret-key"));
    }
}
