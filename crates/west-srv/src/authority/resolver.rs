//! Per-question answer computation, independent of the wire format.

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::ttl_policy;
use crate::challenge::{normalize_name, ChallengeRegistry};
use crate::registry::DeviceRegistry;

/// Query types the resolver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// A record.
    Address,
    /// TXT record.
    Text,
    /// Anything else; answered with nothing.
    Unsupported,
}

/// One question from an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Queried name as received.
    pub name: String,
    /// Record type.
    pub kind: QueryKind,
}

impl Question {
    /// Build a question.
    pub fn new(name: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Record data for one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerData {
    /// IPv4 address.
    Address(Ipv4Addr),
    /// Text value.
    Text(String),
}

/// One answer, tied to the question it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Index of the question in the request.
    pub question: usize,
    /// TTL in seconds.
    pub ttl: u32,
    /// Record data.
    pub data: AnswerData,
}

/// Message-level response code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rcode {
    /// Success, possibly with no answers.
    #[default]
    NoError,
    /// A queried device name does not exist.
    NameError,
    /// The device registry could not be consulted.
    ServerFailure,
}

/// Answers and response code for a whole message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Answers in question order.
    pub answers: Vec<Answer>,
    /// First non-success code raised by any question.
    pub rcode: Rcode,
}

impl Resolution {
    fn raise(&mut self, rcode: Rcode) {
        if self.rcode == Rcode::NoError {
            self.rcode = rcode;
        }
    }
}

/// Authoritative resolver for one zone.
#[derive(Clone)]
pub struct NameResolver {
    zone: String,
    public_ip: Option<Ipv4Addr>,
    devices: Arc<dyn DeviceRegistry>,
    challenges: ChallengeRegistry,
}

impl NameResolver {
    /// Create a resolver for `zone`.
    ///
    /// `public_ip` answers the zone apex; with `None` the apex has no A record.
    pub fn new(
        zone: &str,
        public_ip: Option<Ipv4Addr>,
        devices: Arc<dyn DeviceRegistry>,
        challenges: ChallengeRegistry,
    ) -> Self {
        Self {
            zone: normalize_name(zone),
            public_ip,
            devices,
            challenges,
        }
    }

    /// The normalized zone.
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Resolve every question in order.
    ///
    /// A question that cannot be answered never aborts the others.
    pub async fn resolve(&self, questions: &[Question]) -> Resolution {
        let mut resolution = Resolution::default();

        for (index, question) in questions.iter().enumerate() {
            let host = normalize_name(&question.name);
            let Some(label) = self.zone_relative(&host) else {
                debug!(name = %host, "outside zone, not answering");
                continue;
            };

            match question.kind {
                QueryKind::Address if label.is_empty() => {
                    if let Some(ip) = self.public_ip {
                        resolution.answers.push(Answer {
                            question: index,
                            ttl: ttl_policy::ADDRESS_TTL,
                            data: AnswerData::Address(ip),
                        });
                    }
                }
                QueryKind::Address => match self.devices.find_by_name(label).await {
                    Ok(Some(device)) => {
                        debug!(name = %host, ip = %device.ip, "device answered");
                        resolution.answers.push(Answer {
                            question: index,
                            ttl: ttl_policy::ADDRESS_TTL,
                            data: AnswerData::Address(device.ip),
                        });
                    }
                    Ok(None) => {
                        debug!(name = %host, device = label, "unknown device");
                        resolution.raise(Rcode::NameError);
                    }
                    Err(e) => {
                        warn!(name = %host, error = %e, "device lookup failed");
                        resolution.raise(Rcode::ServerFailure);
                    }
                },
                QueryKind::Text => {
                    if let Some(value) = self.challenges.lookup(&host) {
                        debug!(name = %host, "challenge answered");
                        resolution.answers.push(Answer {
                            question: index,
                            ttl: ttl_policy::CHALLENGE_TTL,
                            data: AnswerData::Text(value),
                        });
                    }
                }
                QueryKind::Unsupported => {}
            }
        }

        resolution
    }

    /// Part of `host` left of the zone: empty at the apex, `None` outside.
    fn zone_relative<'a>(&self, host: &'a str) -> Option<&'a str> {
        if host == self.zone {
            return Some("");
        }
        host.strip_suffix(self.zone.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
            .filter(|label| !label.is_empty())
    }
}

impl std::fmt::Debug for NameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameResolver")
            .field("zone", &self.zone)
            .field("public_ip", &self.public_ip)
            .finish_non_exhaustive()
    }
}
