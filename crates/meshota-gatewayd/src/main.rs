//! meshota-gatewayd - mesh firmware update gateway

#![deny(clippy::unwrap_used)]

use anyhow::{Context, Result};
use clap::Parser;
use meshota_gateway::GatewayConfig;
use meshota_gatewayd::cli::{Cli, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        let json = serde_json::to_string_pretty(&GatewayConfig::default())
            .context("Failed to serialize default config")?;
        println!("{json}");
        return Ok(());
    }

    init_logging(cli.log_level());

    let config = match &cli.config {
        Some(path) => GatewayConfig::load_from_path(path).await?,
        None => GatewayConfig::default(),
    };
    meshota_gatewayd::run(cli.apply(config)).await
}
