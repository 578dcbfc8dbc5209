//! Command line and logging setup.

use std::path::PathBuf;

use clap::Parser;
use meshota_gateway::GatewayConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line of the gateway daemon.
#[derive(Debug, Parser)]
#[command(name = "meshota-gatewayd")]
#[command(about = "Mesh firmware update gateway")]
#[command(version)]
#[command(long_about = "
meshota-gatewayd connects to the mesh bridge's serial endpoint, offers
firmware from the published manifest to nodes that check in, and serves
chunks as nodes pull them. An HTTP API exposes nodes, sessions and the
automatic update switch to operators.
")]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "MESHOTA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bridge serial endpoint (host:port), overrides the config file
    #[arg(long)]
    pub serial: Option<String>,

    /// Operator API bind address, overrides the config file
    #[arg(long)]
    pub api: Option<String>,

    /// Manifest URL, overrides the config file
    #[arg(long)]
    pub manifest_url: Option<String>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print the default configuration as JSON and exit
    #[arg(long)]
    pub print_default_config: bool,
}

impl Cli {
    /// Apply command line overrides on top of a loaded configuration.
    pub fn apply(&self, mut config: GatewayConfig) -> GatewayConfig {
        if let Some(serial) = &self.serial {
            config.serial_addr.clone_from(serial);
        }
        if let Some(api) = &self.api {
            config.api_bind.clone_from(api);
        }
        if let Some(url) = &self.manifest_url {
            config.manifest_url.clone_from(url);
        }
        config
    }

    /// Default filter level for the verbosity count
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("meshota={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "meshota-gatewayd",
            "--serial",
            "10.0.0.5:7000",
            "--manifest-url",
            "https://fw.example/manifest.json",
            "-vv",
        ]);
        let config = cli.apply(GatewayConfig::default());
        assert_eq!(config.serial_addr, "10.0.0.5:7000");
        assert_eq!(config.manifest_url, "https://fw.example/manifest.json");
        assert_eq!(config.api_bind, GatewayConfig::default().api_bind);
        assert_eq!(cli.log_level(), "trace");
    }

    #[tokio::test]
    async fn test_cli_overrides_config_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gateway.json");
        let file = GatewayConfig {
            manifest_url: "https://fw.example/from-file.json".to_string(),
            serial_addr: "10.0.0.1:7000".to_string(),
            ..GatewayConfig::default()
        };
        file.save_to_path(&path).await?;

        let cli = Cli::parse_from(["meshota-gatewayd", "--config", "x", "--serial", "10.0.0.9:7000"]);
        let config = cli.apply(GatewayConfig::load_from_path(&path).await?);
        assert_eq!(config.manifest_url, "https://fw.example/from-file.json");
        assert_eq!(config.serial_addr, "10.0.0.9:7000");
        Ok(())
    }

    #[test]
    fn test_quiet_by_default() {
        let cli = Cli::parse_from(["meshota-gatewayd"]);
        assert_eq!(cli.log_level(), "info");
        assert!(!cli.print_default_config);
        assert!(cli.config.is_none());
    }
}
