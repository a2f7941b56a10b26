//! `westport install` - create the settings record.

use anyhow::{Context, Result};
use west_ca::{generate_ca, CaMaterial, CaRequest};
use west_srv::settings::{install, InstallRequest, SettingsFile};
use west_srv::NodeConfig;

use super::passphrase;
use crate::cli::args::InstallArgs;

pub async fn execute(config: &NodeConfig, args: InstallArgs) -> Result<()> {
    let passphrase = passphrase()?;
    let file = SettingsFile::new(&config.settings_path);

    let ca = match (&args.ca_crt, &args.ca_key) {
        (Some(crt), Some(key)) => {
            let crt_pem = std::fs::read(crt).with_context(|| format!("reading {}", crt.display()))?;
            let key_pem = zeroize::Zeroizing::new(
                std::fs::read(key).with_context(|| format!("reading {}", key.display()))?,
            );
            CaMaterial::from_pem(&crt_pem, &key_pem)?
        }
        _ => generate_ca(&CaRequest {
            name: args.ca_name.clone(),
            ips: vec![args.cidr.clone()],
            ..Default::default()
        })?,
    };

    let settings = install(
        &file,
        passphrase.as_bytes(),
        &ca,
        &InstallRequest {
            domain_zone: args.zone,
            cidr: Some(args.cidr),
            email: args.email,
            cipher: args.cipher,
        },
    )
    .await?;

    println!("Installed west coordination node");
    println!("  settings:  {}", file.path().display());
    println!("  zone:      {}", settings.domain_zone);
    println!("  network:   {}", settings.cidr);
    println!("  node ip:   {}", settings.node_ip);
    println!("  cipher:    {}", settings.cipher);
    println!("  ca:        {}", ca.fingerprint()?);
    Ok(())
}
