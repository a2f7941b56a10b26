//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use west_srv::NodeConfig;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = NodeConfig::load(&cli.config)?;
    if let Some(settings) = cli.settings {
        config.settings_path = settings;
    }

    match cli.command {
        Commands::Install(args) => commands::install::execute(&config, args).await,
        Commands::Add(args) => commands::add::execute(&config, args).await,
        Commands::Start => commands::start::execute(&config).await,
    }
}
