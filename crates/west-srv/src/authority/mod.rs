//! Authoritative DNS for the node's zone.
//!
//! One listener multiplexes two answer sources: device overlay addresses from
//! the [`crate::registry::DeviceRegistry`] and pending DNS-01 values from the
//! name-based [`crate::challenge::ChallengeRegistry`]. Names outside the zone
//! are never answered.

pub mod handler;
pub mod resolver;
pub mod ttl_policy;

pub use handler::ZoneHandler;
pub use resolver::{Answer, AnswerData, NameResolver, QueryKind, Question, Resolution, Rcode};
