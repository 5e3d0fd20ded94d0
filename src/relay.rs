// src/relay.rs
//! Top-level wiring: startup gate, ingestion task, query server

use crate::{
    config::RelayConfig,
    error::Result,
    gps::{FixAggregator, SharedFix},
    ingest::IngestionLoop,
    link::{LinkSupervisor, SerialDevice, SerialLink},
    server,
    startup::{self, GpsPower},
};
use std::io;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Owns the one shared fix and everything that touches it
pub struct Relay<L: SerialLink> {
    config: RelayConfig,
    link: L,
    fix: SharedFix,
}

impl Relay<SerialDevice> {
    /// Relay reading from the serial port named in the config
    pub fn from_config(config: RelayConfig) -> Self {
        let device = SerialDevice::new(
            config.serial_port.clone(),
            config.baudrate,
            config.read_timeout(),
        );
        Self::new(config, device)
    }
}

impl<L: SerialLink + 'static> Relay<L> {
    pub fn new(config: RelayConfig, link: L) -> Self {
        Self {
            config,
            link,
            fix: SharedFix::new(),
        }
    }

    /// Handle to the shared fix
    pub fn fix(&self) -> SharedFix {
        self.fix.clone()
    }

    /// Power on the GPS, then ingest and serve until Ctrl+C.
    ///
    /// Nothing is read from the serial port and no socket is bound unless
    /// the startup gate passes.
    pub async fn run<P: GpsPower>(self, power: &P) -> Result<()> {
        if self.config.enable_gps {
            startup::enable_gps(power, &self.config.enable_command).await?;
        } else {
            info!("skipping gps power-on");
        }

        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let static_dir = self.config.static_dir.clone();
        let query = self.fix.clone();
        let ingestion = self.start_ingestion();

        let result = tokio::select! {
            result = server::serve(listener, query, static_dir) => result,
            signal = tokio::signal::ctrl_c() => shutdown_on(signal),
        };

        ingestion.abort();
        result
    }

    fn start_ingestion(self) -> tokio::task::JoinHandle<()> {
        info!(
            "reading gps from {} (backoff {:?})",
            self.link.describe(),
            self.config.reconnect_backoff()
        );

        let supervisor = LinkSupervisor::new(self.link, self.fix.clone(), self.config.reconnect_backoff())
            .with_max_silent_reads(self.config.max_silent_reads);
        IngestionLoop::new(FixAggregator::new(self.fix)).spawn(supervisor)
    }
}

/// Outcome of the Ctrl+C wait. A handler that could not be installed stops
/// the relay with an error instead of a silent clean exit.
fn shutdown_on(signal: io::Result<()>) -> Result<()> {
    match signal {
        Ok(()) => {
            info!("shutting down");
            Ok(())
        }
        Err(e) => {
            error!("failed to listen for Ctrl+C: {}", e);
            Err(e.into())
        }
    }
}
