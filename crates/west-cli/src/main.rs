//! westport - west coordination node

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    west_cli::run().await
}
