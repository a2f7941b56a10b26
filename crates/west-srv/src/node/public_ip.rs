//! Public address discovery.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::SrvError;

/// Echo service returning the caller's address as plain text.
pub const PUBLIC_IP_URL: &str = "https://checkip.amazonaws.com";

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Ask `url` for this host's public IPv4 address.
pub async fn discover_public_ip(url: &str) -> crate::Result<Ipv4Addr> {
    let client = reqwest::Client::builder()
        .timeout(DISCOVERY_TIMEOUT)
        .build()
        .map_err(|e| SrvError::Server(format!("http client: {e}")))?;

    let body = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| SrvError::Server(format!("public address lookup: {e}")))?
        .text()
        .await
        .map_err(|e| SrvError::Server(format!("public address lookup: {e}")))?;

    body.trim()
        .parse()
        .map_err(|e| SrvError::Server(format!("public address lookup returned '{}': {e}", body.trim())))
}
