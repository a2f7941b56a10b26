//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use west_srv::mesh::Cipher;

/// Coordination node for a west mesh network
///
/// Holds the network CA, answers DNS for the network's zone and keeps the
/// node's TLS certificate renewed. The encryption passphrase is read from
/// WESTPORT_PASSPHRASE.
#[derive(Parser, Debug)]
#[command(name = "westport")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Node configuration file (TOML)
    #[arg(short, long, env = "WESTPORT_CONFIG", global = true, default_value = "westport.toml")]
    pub config: PathBuf,

    /// Settings record location, overriding the configuration file
    #[arg(long, env = "WESTPORT_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the settings record for a new network
    Install(InstallArgs),

    /// Issue a provisioning token for a new device
    Add(AddArgs),

    /// Run the node
    Start,
}

// ============================================================================
// Install command
// ============================================================================

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Zone this node is authoritative for (e.g. west.example.com)
    #[arg(long)]
    pub zone: String,

    /// Existing CA certificate (PEM). A new CA is generated when omitted.
    #[arg(long, requires = "ca_key")]
    pub ca_crt: Option<PathBuf>,

    /// Existing CA private key (PEM)
    #[arg(long, requires = "ca_crt")]
    pub ca_key: Option<PathBuf>,

    /// Name for a generated CA
    #[arg(long, default_value = "west")]
    pub ca_name: String,

    /// Overlay network
    #[arg(long, default_value = west_srv::settings::DEFAULT_CIDR)]
    pub cidr: String,

    /// ACME contact email
    #[arg(long)]
    pub email: Option<String>,

    /// Mesh cipher suite (aes or chachapoly)
    #[arg(long, default_value = "aes")]
    pub cipher: Cipher,
}

// ============================================================================
// Add command
// ============================================================================

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Device name. Must be unique.
    #[arg(long)]
    pub name: String,

    /// Overlay address. Must be unique within the network.
    #[arg(long)]
    pub ip: Ipv4Addr,

    /// Where the device redeems the token. Defaults to https://<zone>.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Token lifetime in hours
    #[arg(long, default_value = "24")]
    pub ttl_hours: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_args() {
        let cli = Cli::try_parse_from([
            "westport",
            "install",
            "--zone",
            "west.example.com",
            "--cipher",
            "chachapoly",
        ])
        .unwrap();
        let Commands::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.cidr, "10.10.10.0/24");
        assert_eq!(args.cipher, Cipher::ChaChaPoly);
        assert!(args.ca_crt.is_none());
    }

    #[test]
    fn test_ca_files_come_in_pairs() {
        assert!(Cli::try_parse_from([
            "westport",
            "install",
            "--zone",
            "west.example.com",
            "--ca-crt",
            "ca.crt",
        ])
        .is_err());
    }

    #[test]
    fn test_add_requires_ipv4() {
        assert!(Cli::try_parse_from(["westport", "add", "--name", "alpha", "--ip", "fd00::1"]).is_err());
        let cli = Cli::try_parse_from(["westport", "add", "--name", "alpha", "--ip", "10.10.10.5"]).unwrap();
        assert!(matches!(cli.command, Commands::Add(AddArgs { ttl_hours: 24, .. })));
    }
}
