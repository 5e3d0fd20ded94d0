// src/gps/mod.rs
//! GPS sentence decoding and fix aggregation

pub mod aggregator;
pub mod fix;
pub mod nmea;

pub use aggregator::FixAggregator;
pub use fix::{Fix, FixQuery, LinkStatus, SharedFix};
pub use nmea::{parse_sentence, ParseError, SentenceRecord};
