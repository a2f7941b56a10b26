//! TTL policy constants for answered records.
//!
//! Device addresses are stable for the life of an enrollment. Challenge
//! values exist only for the length of one issuance attempt, so resolvers
//! must not hold them for long.

/// TTL for A records (zone apex and devices).
pub const ADDRESS_TTL: u32 = 300;

/// TTL for DNS-01 challenge TXT records.
pub const CHALLENGE_TTL: u32 = 60;
