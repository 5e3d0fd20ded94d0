// src/error.rs
//! Error types for the GPS relay

use crate::gps::nmea::ParseError;
use std::fmt;

pub type Result<T> = std::result::Result<T, GpsError>;

#[derive(Debug)]
pub enum GpsError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    /// The serial link dropped or produced no data for too long.
    Link(String),
    Parse(ParseError),
    /// A decoded sentence lacked a field the aggregator needs.
    MissingField(&'static str),
    /// The GPS chipset could not be powered on.
    Startup(String),
    Config(String),
    Other(String),
}

impl GpsError {
    /// Whether this error means the serial device itself went away, as
    /// opposed to something unexpected happening around it.
    pub fn is_link_failure(&self) -> bool {
        match self {
            // Bad port settings are a configuration problem, not a missing device
            GpsError::Serial(e) => e.kind() != tokio_serial::ErrorKind::InvalidInput,
            GpsError::Io(_) | GpsError::Link(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for GpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpsError::Io(e) => write!(f, "IO error: {}", e),
            GpsError::Serial(e) => write!(f, "Serial error: {}", e),
            GpsError::Json(e) => write!(f, "JSON error: {}", e),
            GpsError::Http(e) => write!(f, "HTTP error: {}", e),
            GpsError::Link(msg) => write!(f, "Link error: {}", msg),
            GpsError::Parse(e) => write!(f, "Parse error: {}", e),
            GpsError::MissingField(field) => write!(f, "Missing field: {}", field),
            GpsError::Startup(msg) => write!(f, "Startup error: {}", msg),
            GpsError::Config(msg) => write!(f, "Config error: {}", msg),
            GpsError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for GpsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpsError::Io(e) => Some(e),
            GpsError::Serial(e) => Some(e),
            GpsError::Json(e) => Some(e),
            GpsError::Http(e) => Some(e),
            GpsError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GpsError {
    fn from(error: std::io::Error) -> Self {
        GpsError::Io(error)
    }
}

impl From<tokio_serial::Error> for GpsError {
    fn from(error: tokio_serial::Error) -> Self {
        GpsError::Serial(error)
    }
}

impl From<serde_json::Error> for GpsError {
    fn from(error: serde_json::Error) -> Self {
        GpsError::Json(error)
    }
}

impl From<reqwest::Error> for GpsError {
    fn from(error: reqwest::Error) -> Self {
        GpsError::Http(error)
    }
}

impl From<ParseError> for GpsError {
    fn from(error: ParseError) -> Self {
        GpsError::Parse(error)
    }
}
