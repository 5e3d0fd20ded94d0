// src/startup.rs
//! Powering on the GNSS engine of the cellular modem before ingestion
//!
//! The modem is driven by a local hardware manager that exposes AT command
//! execution over JSON-RPC. Asking an already running GNSS engine to start
//! again yields `+CME ERROR: 504`, which is treated as success.

use crate::error::{GpsError, Result};
use serde::Deserialize;
use std::{future::Future, time::Duration};
use tracing::{error, info};

/// Modem reply meaning "GNSS session already active"
pub const ALREADY_ENABLED: &str = "+CME ERROR: 504";

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one AT command as reported by the hardware manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommandReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub response: Vec<String>,
}

impl CommandReply {
    /// Whether the GNSS engine is on after this reply
    pub fn gps_enabled(&self) -> bool {
        self.success || self.response.first().is_some_and(|line| line.trim() == ALREADY_ENABLED)
    }
}

/// Executes modem AT commands
pub trait GpsPower: Send + Sync {
    fn execute(&self, command: &str) -> impl Future<Output = Result<CommandReply>> + Send;
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<CommandReply>,
    error: Option<RpcError>,
}

/// JSON-RPC 2.0 client for the modem hardware manager
#[derive(Debug, Clone)]
pub struct ModemRpcClient {
    url: String,
    method: String,
    http: reqwest::Client,
}

impl ModemRpcClient {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gps-relay/", env!("CARGO_PKG_VERSION")))
            .timeout(RPC_TIMEOUT)
            .build()?;

        Ok(Self {
            url: url.into(),
            method: method.into(),
            http,
        })
    }
}

impl GpsPower for ModemRpcClient {
    async fn execute(&self, command: &str) -> Result<CommandReply> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": self.method,
            "params": [command],
            "id": 1,
        });

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (response.result, response.error) {
            (_, Some(err)) => Err(GpsError::Other(format!(
                "{} returned error {}: {}",
                self.method, err.code, err.message
            ))),
            (Some(reply), None) => Ok(reply),
            (None, None) => Err(GpsError::Other(format!(
                "{} returned neither result nor error",
                self.method
            ))),
        }
    }
}

/// Turn on the GNSS engine, once, before anything reads the serial port.
///
/// Any failure other than "already enabled" is fatal and comes back as
/// [`GpsError::Startup`].
pub async fn enable_gps<P: GpsPower>(power: &P, command: &str) -> Result<()> {
    info!("starting gps ({}) ...", command);

    let reply = power.execute(command).await.map_err(|e| {
        error!("starting gps failed: {}", e);
        GpsError::Startup(format!("{} could not be sent: {}", command, e))
    })?;

    if reply.gps_enabled() {
        info!("starting gps success");
        Ok(())
    } else {
        error!("starting gps failed: {:?}", reply);
        Err(GpsError::Startup(format!(
            "{} rejected by modem: {}",
            command,
            reply.response.join(" | ")
        )))
    }
}
