//! `westport add` - issue a provisioning token for a new device.

use anyhow::Result;
use chrono::Duration;
use west_srv::provision::ProvisioningTokenService;
use west_srv::settings::SettingsFile;
use west_srv::NodeConfig;

use super::passphrase;
use crate::cli::args::AddArgs;

pub async fn execute(config: &NodeConfig, args: AddArgs) -> Result<()> {
    anyhow::ensure!(args.ttl_hours > 0, "--ttl-hours must be positive");

    let settings = SettingsFile::new(&config.settings_path).load().await?;
    let secrets = settings.unlock(passphrase()?.as_bytes())?;
    let ca = settings.ca_material(&secrets)?;

    let endpoint = args
        .endpoint
        .unwrap_or_else(|| format!("https://{}", settings.domain_zone));

    let token = ProvisioningTokenService::new(&secrets)?.issue_for_device(
        &settings,
        &args.name,
        args.ip,
        &ca.certificate_pem()?,
        &endpoint,
        Duration::hours(args.ttl_hours),
    )?;

    println!("{token}");
    Ok(())
}
