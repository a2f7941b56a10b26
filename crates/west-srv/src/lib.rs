//! west-srv: trust and identity core of a west mesh coordination node.
//!
//! Issues and renews identities for devices and for the node itself,
//! protects long-lived secrets at rest, and answers the DNS and HTTP
//! queries needed to prove domain control to an ACME authority.
//!
//! # Architecture
//!
//! ```text
//!                    ┌────────────────────┐
//!  devices ──token──►│ provision          │──► west-ca (sign leaf)
//!                    └─────────┬──────────┘          │
//!                              ▼                      ▼
//!                       DeviceRegistry ◄──── authority (DNS, UDP/TCP :53)
//!                                                     ▲
//!  ACME server ◄──── acme lifecycle ──► challenge ────┘ (TXT)
//!                          │                └──► HTTP :80 well-known path
//!                          ▼
//!                    secrets (AES-256-GCM) ──► settings record on disk
//! ```
//!
//! Every listener runs as a task under one cancellation scope; see [`node`].

pub mod acme;
pub mod authority;
pub mod challenge;
pub mod config;
pub mod error;
pub mod mesh;
pub mod node;
pub mod provision;
pub mod registry;
pub mod secrets;
pub mod server;
pub mod settings;

// Re-exports for convenience.
pub use config::NodeConfig;
pub use error::SrvError;

/// Result type for west-srv operations.
pub type Result<T> = std::result::Result<T, SrvError>;
