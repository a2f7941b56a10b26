//! Node configuration for a west coordination node.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Let's Encrypt production directory.
pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory.
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Configuration for a coordination node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// DNS listen address, UDP and TCP (default: 0.0.0.0:53).
    #[serde(default = "default_dns_listen")]
    pub dns_listen: SocketAddr,

    /// HTTP listen address for path-based challenges (default: 0.0.0.0:80).
    #[serde(default = "default_http_listen")]
    pub http_listen: SocketAddr,

    /// Mesh transport listen address (default: [::]:4242).
    #[serde(default = "default_mesh_listen")]
    pub mesh_listen: SocketAddr,

    /// Path to the persisted settings record.
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,

    /// Public address announced at the zone apex. Discovered when unset.
    #[serde(default)]
    pub public_ip: Option<Ipv4Addr>,

    /// Seconds to wait for tasks to unwind before aborting them.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Certificate issuance settings.
    #[serde(default)]
    pub acme: AcmeConfig,
}

/// ACME issuance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeConfig {
    /// Contact email for the ACME account. Falls back to the one stored at install.
    #[serde(default)]
    pub email: Option<String>,

    /// ACME directory URL.
    #[serde(default = "default_directory_url")]
    pub directory_url: String,

    /// Use the staging directory instead of `directory_url`.
    #[serde(default)]
    pub staging: bool,

    /// Which proof-of-control methods to offer.
    #[serde(default)]
    pub challenge: ChallengeMode,

    /// Renew once a certificate is this close to expiry.
    #[serde(default = "default_renew_before_days")]
    pub renew_before_days: i64,
}

/// Proof-of-control methods offered to the ACME server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeMode {
    /// Well-known HTTP path only.
    Http,
    /// DNS TXT record only.
    Dns,
    /// Offer both, prefer HTTP.
    #[default]
    Both,
}

impl ChallengeMode {
    /// Whether the path-based provider is registered.
    pub const fn http(self) -> bool {
        matches!(self, Self::Http | Self::Both)
    }

    /// Whether the name-based provider is registered.
    pub const fn dns(self) -> bool {
        matches!(self, Self::Dns | Self::Both)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            dns_listen: default_dns_listen(),
            http_listen: default_http_listen(),
            mesh_listen: default_mesh_listen(),
            settings_path: default_settings_path(),
            public_ip: None,
            shutdown_grace_secs: default_shutdown_grace(),
            acme: AcmeConfig::default(),
        }
    }
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            email: None,
            directory_url: default_directory_url(),
            staging: false,
            challenge: ChallengeMode::default(),
            renew_before_days: default_renew_before_days(),
        }
    }
}

impl AcmeConfig {
    /// Directory to talk to, honoring `staging`.
    pub fn directory(&self) -> &str {
        if self.staging {
            LETS_ENCRYPT_STAGING
        } else {
            &self.directory_url
        }
    }
}

impl NodeConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| crate::SrvError::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }
}

// Default value functions for serde.
const fn default_dns_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 53)
}

const fn default_http_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 80)
}

const fn default_mesh_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 4242)
}

fn default_settings_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("westport")
        .join("settings.json")
}

const fn default_shutdown_grace() -> u64 {
    15
}

fn default_directory_url() -> String {
    String::from(LETS_ENCRYPT_PRODUCTION)
}

const fn default_renew_before_days() -> i64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.dns_listen.port(), 53);
        assert_eq!(config.http_listen.port(), 80);
        assert_eq!(config.mesh_listen.port(), 4242);
        assert_eq!(config.shutdown_grace_secs, 15);
        assert_eq!(config.acme.renew_before_days, 30);
        assert_eq!(config.acme.challenge, ChallengeMode::Both);
        assert!(config.settings_path.ends_with("westport/settings.json"));
    }

    #[test]
    fn test_partial_toml() {
        let config: NodeConfig = toml::from_str(
            r#"
            public_ip = "203.0.113.7"

            [acme]
            email = "ops@example.com"
            challenge = "dns"
            staging = true
            "#,
        )
        .unwrap();

        assert_eq!(config.public_ip, Some("203.0.113.7".parse().unwrap()));
        assert_eq!(config.dns_listen.port(), 53);
        assert!(!config.acme.challenge.http());
        assert!(config.acme.challenge.dns());
        assert_eq!(config.acme.directory(), LETS_ENCRYPT_STAGING);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.acme.directory(), LETS_ENCRYPT_PRODUCTION);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "dns_listen = 12").unwrap();
        assert!(matches!(
            NodeConfig::load(&path),
            Err(crate::SrvError::Config(_))
        ));
    }
}
