// src/main.rs
//! GPS Relay - serial NMEA reader with an HTTP fix endpoint

use anyhow::Context;
use clap::Parser;
use gps_relay::{
    config::{ConfigOverrides, RelayConfig},
    link, logging,
    startup::ModemRpcClient,
    Relay,
};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gps-relay", version, about)]
struct Cli {
    /// Configuration file (defaults to the per-user config)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Write the effective configuration back to the config file and exit
    #[arg(long)]
    save_config: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if cli.list_ports {
        let ports = link::list_serial_ports().context("Failed to list serial ports")?;
        if ports.is_empty() {
            println!("No serial ports found.");
        } else {
            println!("Available serial ports:");
            for port in ports {
                println!("  {}", port);
            }
        }
        return Ok(());
    }

    let mut config = RelayConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply(&cli.overrides);
    config.validate().context("Invalid configuration")?;

    if cli.save_config {
        let path = config
            .save(cli.config.as_deref())
            .context("Failed to save configuration")?;
        println!("Configuration saved to {}", path.display());
        return Ok(());
    }

    let power = ModemRpcClient::new(config.rpc_url.clone(), config.rpc_method.clone())
        .context("Failed to build RPC client")?;

    Relay::from_config(config)
        .run(&power)
        .await
        .context("GPS relay stopped")?;

    Ok(())
}
