//! `westport start` - run the node.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use west_srv::mesh::ConfigFileTransport;
use west_srv::node::{self, NodeServices};
use west_srv::registry::MemoryRegistry;
use west_srv::NodeConfig;

use super::passphrase;

/// Mesh configuration file, next to the settings record.
const MESH_CONFIG_FILE: &str = "mesh.yml";

pub async fn execute(config: &NodeConfig) -> Result<()> {
    let passphrase = passphrase()?;

    let mesh_path = config
        .settings_path
        .parent()
        .map_or_else(|| MESH_CONFIG_FILE.into(), |dir| dir.join(MESH_CONFIG_FILE));

    info!(settings = %config.settings_path.display(), mesh_config = %mesh_path.display(), "starting westport");

    let services = NodeServices {
        registry: Arc::new(MemoryRegistry::new()),
        transport: Arc::new(ConfigFileTransport::new(&mesh_path)),
        issuer: None,
    };

    node::run(config, passphrase.as_bytes(), services, CancellationToken::new()).await?;
    Ok(())
}
