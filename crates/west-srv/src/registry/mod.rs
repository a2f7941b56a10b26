//! Device registry seam.
//!
//! The registry's real storage lives outside this crate. The resolver and the
//! provisioning service only need name lookup and creation with uniqueness
//! on both name and overlay address, which is what [`DeviceRegistry`] exposes.
//! [`MemoryRegistry`] is the in-process implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Errors from a device registry backend.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Another device already has this name.
    #[error("device name already registered: {0}")]
    NameTaken(String),

    /// Another device already has this overlay address.
    #[error("overlay address already assigned: {0}")]
    AddressTaken(Ipv4Addr),

    /// Backend failure.
    #[error("registry backend error: {0}")]
    Backend(String),
}

/// A registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique device name, also its label under the zone.
    pub name: String,
    /// Unique overlay address.
    pub ip: Ipv4Addr,
    /// Fingerprint of the device's signed certificate.
    pub fingerprint: String,
    /// When the device was registered.
    pub created_at: DateTime<Utc>,
}

/// Lookup and creation of device records.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Exact-match lookup by name. `Ok(None)` when absent.
    async fn find_by_name(&self, name: &str) -> Result<Option<DeviceRecord>, RegistryError>;

    /// Register a device. Fails if the name or address is taken.
    async fn create(
        &self,
        name: &str,
        ip: Ipv4Addr,
        fingerprint: &str,
    ) -> Result<DeviceRecord, RegistryError>;
}

/// In-memory registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    devices: Arc<RwLock<HashMap<String, DeviceRecord>>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// True when no devices are registered.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[async_trait]
impl DeviceRegistry for MemoryRegistry {
    async fn find_by_name(&self, name: &str) -> Result<Option<DeviceRecord>, RegistryError> {
        Ok(self.devices.read().await.get(name).cloned())
    }

    async fn create(
        &self,
        name: &str,
        ip: Ipv4Addr,
        fingerprint: &str,
    ) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self.devices.write().await;

        if devices.contains_key(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        if devices.values().any(|d| d.ip == ip) {
            return Err(RegistryError::AddressTaken(ip));
        }

        let record = DeviceRecord {
            name: name.to_string(),
            ip,
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
        };
        devices.insert(name.to_string(), record.clone());

        info!(device = name, %ip, "device registered");
        Ok(record)
    }
}
