//! Hands the configuration to an external engine through a file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{MeshConfig, MeshTransport, OnStarted};

/// Writes the rendered configuration where an external engine picks it up,
/// then holds until stopped. The file is removed on the way out since it
/// carries the node's private key.
#[derive(Debug)]
pub struct ConfigFileTransport {
    path: PathBuf,
    /// Stop signal for the current run; replaced on every start.
    stopped: Mutex<CancellationToken>,
}

impl ConfigFileTransport {
    /// Write configuration to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stopped: Mutex::new(CancellationToken::new()),
        }
    }

    /// Where the configuration is written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stop_signal(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MeshTransport for ConfigFileTransport {
    async fn start(
        &self,
        config: MeshConfig,
        on_started: OnStarted,
        shutdown: CancellationToken,
    ) -> crate::Result<()> {
        let stopped = CancellationToken::new();
        *self.stop_signal() = stopped.clone();

        let yaml = config.to_yaml()?;
        crate::settings::write_private(&self.path, yaml.as_bytes()).await?;

        info!(path = %self.path.display(), listen_port = config.listen.port, "mesh configuration written");
        on_started();

        tokio::select! {
            () = shutdown.cancelled() => {}
            () = stopped.cancelled() => {}
        }

        tokio::fs::remove_file(&self.path).await?;
        info!("mesh transport stopped");
        Ok(())
    }

    async fn stop(&self) -> crate::Result<()> {
        self.stop_signal().cancel();
        Ok(())
    }
}
