//! Error types for the west coordination node.

use thiserror::Error;

use crate::acme::AcmeError;
use crate::provision::TokenError;
use crate::registry::RegistryError;
use crate::secrets::SecretError;

/// Errors that can occur in west-srv operations.
#[derive(Error, Debug)]
pub enum SrvError {
    /// A listener failed to bind or start.
    #[error("server error: {0}")]
    Server(String),

    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(String),

    /// Settings record missing, corrupt or already present.
    #[error("settings error: {0}")]
    Settings(String),

    /// Device registry rejected an operation.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Mesh transport failed.
    #[error("mesh transport error: {0}")]
    Mesh(String),

    /// Certificate authority refused.
    #[error(transparent)]
    Ca(#[from] west_ca::CaError),

    /// Secret sealing or opening failed.
    #[error(transparent)]
    Secret(#[from] SecretError),

    /// Certificate lifecycle failed.
    #[error(transparent)]
    Acme(#[from] AcmeError),

    /// Provisioning token rejected.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
