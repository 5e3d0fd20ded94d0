// src/gps/nmea.rs
//! NMEA-0183 sentence decoding
//!
//! Only the sentences the relay folds into a fix (GGA, RMC, GSV) are decoded
//! into typed records. Anything else that is well formed comes back as
//! [`SentenceRecord::Other`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

/// GGA: position fix data
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>, // meters above mean sea level
}

/// RMC: recommended minimum navigation data
#[derive(Debug, Clone, PartialEq)]
pub struct MinimumNav {
    pub datetime: Option<NaiveDateTime>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_knots: Option<f64>,
}

/// GSV: satellites in view
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteView {
    pub num_sv_in_view: u32,
}

/// A decoded sentence
#[derive(Debug, Clone, PartialEq)]
pub enum SentenceRecord {
    PositionFix(PositionFix),
    MinimumNav(MinimumNav),
    SatelliteView(SatelliteView),
    /// Well formed but not folded into the fix; carries the sentence type.
    Other(String),
}

impl SentenceRecord {
    /// Short name used in log output
    pub fn kind(&self) -> &str {
        match self {
            SentenceRecord::PositionFix(_) => "GGA",
            SentenceRecord::MinimumNav(_) => "RMC",
            SentenceRecord::SatelliteView(_) => "GSV",
            SentenceRecord::Other(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Line does not begin with `$`
    MissingStart,
    /// Address field is not a talker + sentence type
    BadAddress(String),
    /// Checksum present but not two hex digits
    BadChecksumField(String),
    ChecksumMismatch { expected: u8, actual: u8 },
    /// Fewer comma separated fields than the sentence type requires
    TooFewFields { sentence: &'static str, expected: usize, found: usize },
    InvalidField { field: &'static str, value: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingStart => write!(f, "sentence does not start with '$'"),
            ParseError::BadAddress(addr) => write!(f, "invalid address field '{}'", addr),
            ParseError::BadChecksumField(cs) => write!(f, "invalid checksum field '{}'", cs),
            ParseError::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: sentence says {:02X}, computed {:02X}",
                expected, actual
            ),
            ParseError::TooFewFields { sentence, expected, found } => write!(
                f,
                "{} needs at least {} fields, found {}",
                sentence, expected, found
            ),
            ParseError::InvalidField { field, value } => {
                write!(f, "invalid {} '{}'", field, value)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse a single NMEA sentence into a typed record.
///
/// The checksum is verified when the sentence carries one; sentences without
/// a `*hh` suffix are accepted as-is.
pub fn parse_sentence(line: &str) -> Result<SentenceRecord, ParseError> {
    let line = line.trim();
    let body = line.strip_prefix('$').ok_or(ParseError::MissingStart)?;

    let body = match body.split_once('*') {
        Some((data, checksum)) => {
            verify_checksum(data, checksum)?;
            data
        }
        None => body,
    };

    let parts: Vec<&str> = body.split(',').collect();
    let sentence_type = sentence_type(parts[0])?;

    match sentence_type {
        "GGA" => parse_gga(&parts).map(SentenceRecord::PositionFix),
        "RMC" => parse_rmc(&parts).map(SentenceRecord::MinimumNav),
        "GSV" => parse_gsv(&parts).map(SentenceRecord::SatelliteView),
        other => Ok(SentenceRecord::Other(other.to_string())),
    }
}

/// XOR of every byte between `$` and `*`
pub fn checksum(data: &str) -> u8 {
    data.bytes().fold(0, |acc, b| acc ^ b)
}

fn verify_checksum(data: &str, field: &str) -> Result<(), ParseError> {
    let field = field.trim();
    if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseError::BadChecksumField(field.to_string()));
    }
    let expected = u8::from_str_radix(field, 16)
        .map_err(|_| ParseError::BadChecksumField(field.to_string()))?;
    let actual = checksum(data);
    if expected != actual {
        return Err(ParseError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Extract the sentence type from the address field.
///
/// Standard addresses are a two letter talker (GP, GN, GL, GA, GB, BD...)
/// followed by the three letter type. Proprietary `P...` addresses are
/// returned whole.
fn sentence_type(address: &str) -> Result<&str, ParseError> {
    if address.is_empty() || !address.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ParseError::BadAddress(address.to_string()));
    }
    if address.starts_with('P') {
        return Ok(address);
    }
    if address.len() != 5 {
        return Err(ParseError::BadAddress(address.to_string()));
    }
    Ok(&address[2..])
}

fn require_fields(parts: &[&str], sentence: &'static str, expected: usize) -> Result<(), ParseError> {
    if parts.len() < expected {
        return Err(ParseError::TooFewFields {
            sentence,
            expected,
            found: parts.len(),
        });
    }
    Ok(())
}

/// Parse GGA (Global Positioning System Fix Data)
fn parse_gga(parts: &[&str]) -> Result<PositionFix, ParseError> {
    require_fields(parts, "GGA", 10)?;

    Ok(PositionFix {
        latitude: parse_coordinate(parts[2], parts[3], "latitude")?,
        longitude: parse_coordinate(parts[4], parts[5], "longitude")?,
        altitude: parse_optional(parts[9], "altitude")?,
    })
}

/// Parse RMC (Recommended Minimum Navigation Information)
fn parse_rmc(parts: &[&str]) -> Result<MinimumNav, ParseError> {
    require_fields(parts, "RMC", 10)?;

    let time = parse_time(parts[1])?;
    let date = parse_date(parts[9])?;
    let datetime = match (date, time) {
        (Some(date), Some(time)) => Some(date.and_time(time)),
        _ => None,
    };

    Ok(MinimumNav {
        datetime,
        latitude: parse_coordinate(parts[3], parts[4], "latitude")?,
        longitude: parse_coordinate(parts[5], parts[6], "longitude")?,
        speed_knots: parse_optional(parts[7], "speed over ground")?,
    })
}

/// Parse GSV (Satellites in View)
fn parse_gsv(parts: &[&str]) -> Result<SatelliteView, ParseError> {
    require_fields(parts, "GSV", 4)?;

    let num_sv_in_view = parse_optional::<u32>(parts[3], "satellites in view")?.ok_or(
        ParseError::InvalidField {
            field: "satellites in view",
            value: String::new(),
        },
    )?;

    Ok(SatelliteView { num_sv_in_view })
}

/// Convert an NMEA `(d)ddmm.mmmm` value plus hemisphere into decimal degrees.
///
/// An empty value decodes to 0.0, which the fix treats as "unknown".
fn parse_coordinate(value: &str, hemisphere: &str, field: &'static str) -> Result<f64, ParseError> {
    if value.is_empty() {
        return Ok(0.0);
    }

    let raw = value.parse::<f64>().map_err(|_| ParseError::InvalidField {
        field,
        value: value.to_string(),
    })?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;

    match hemisphere {
        "S" | "W" => Ok(-decimal),
        _ => Ok(decimal),
    }
}

fn parse_optional<T: std::str::FromStr>(value: &str, field: &'static str) -> Result<Option<T>, ParseError> {
    if value.is_empty() {
        return Ok(None);
    }
    value.parse::<T>().map(Some).map_err(|_| ParseError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// `hhmmss(.sss)`; fractional seconds are dropped
fn parse_time(value: &str) -> Result<Option<NaiveTime>, ParseError> {
    if value.is_empty() {
        return Ok(None);
    }
    let whole = value.split('.').next().unwrap_or(value);
    NaiveTime::parse_from_str(whole, "%H%M%S")
        .map(Some)
        .map_err(|_| ParseError::InvalidField {
            field: "time",
            value: value.to_string(),
        })
}

/// `ddmmyy`
fn parse_date(value: &str) -> Result<Option<NaiveDate>, ParseError> {
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%d%m%y")
        .map(Some)
        .map_err(|_| ParseError::InvalidField {
            field: "date",
            value: value.to_string(),
        })
}
