//! Command implementations.

pub mod add;
pub mod install;
pub mod start;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// Environment variable carrying the encryption passphrase.
pub const PASSPHRASE_ENV: &str = "WESTPORT_PASSPHRASE";

/// The encryption passphrase. Empty counts as missing.
pub fn passphrase() -> Result<Zeroizing<String>> {
    let value = std::env::var(PASSPHRASE_ENV)
        .map(Zeroizing::new)
        .with_context(|| format!("{PASSPHRASE_ENV} must be set"))?;
    anyhow::ensure!(!value.is_empty(), "{PASSPHRASE_ENV} must not be empty");
    Ok(value)
}
