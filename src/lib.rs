// src/lib.rs
//! GPS Relay Library
//!
//! Reads NMEA sentences from a serial GPS receiver, keeps the latest
//! consolidated fix and serves it over HTTP.

pub mod config;
pub mod error;
pub mod gps;
pub mod ingest;
pub mod link;
pub mod logging;
pub mod relay;
pub mod server;
pub mod startup;

// Re-export main types for convenience
pub use error::{GpsError, Result};
pub use gps::{Fix, FixQuery, LinkStatus, SharedFix};
pub use relay::Relay;
