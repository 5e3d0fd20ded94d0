// src/gps/aggregator.rs
//! Folds decoded sentences into the shared fix

use super::fix::SharedFix;
use super::nmea::{MinimumNav, PositionFix, SatelliteView, SentenceRecord};
use crate::error::{GpsError, Result};
use std::collections::VecDeque;

/// Number of GSV reports the satellite count is smoothed over
pub const SATELLITE_WINDOW: usize = 6;

pub const KNOTS_TO_KMH: f64 = 1.852;

/// Rolling maximum over the last [`SATELLITE_WINDOW`] in-view counts.
///
/// A single GSV sentence may only cover one constellation, so the raw count
/// jumps between sentences.
#[derive(Debug, Clone, Default)]
pub struct SatelliteWindow {
    counts: VecDeque<u32>,
}

impl SatelliteWindow {
    pub fn new() -> Self {
        Self {
            counts: VecDeque::with_capacity(SATELLITE_WINDOW),
        }
    }

    /// Push a count, evicting the oldest once full, and return the new max
    pub fn push(&mut self, count: u32) -> u32 {
        if self.counts.len() == SATELLITE_WINDOW {
            self.counts.pop_front();
        }
        self.counts.push_back(count);
        self.max()
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Single writer of the fix's positional, velocity and satellite fields
#[derive(Debug)]
pub struct FixAggregator {
    fix: SharedFix,
    satellites: SatelliteWindow,
}

impl FixAggregator {
    pub fn new(fix: SharedFix) -> Self {
        Self {
            fix,
            satellites: SatelliteWindow::new(),
        }
    }

    /// Fold one record into the fix.
    ///
    /// Each call takes the write lock once, so a reader sees either none or
    /// all of a record's fields. On error nothing is written.
    pub fn apply(&mut self, record: &SentenceRecord) -> Result<()> {
        match record {
            SentenceRecord::PositionFix(gga) => {
                self.apply_position(gga);
                Ok(())
            }
            SentenceRecord::MinimumNav(rmc) => self.apply_minimum_nav(rmc),
            SentenceRecord::SatelliteView(gsv) => {
                self.apply_satellites(gsv);
                Ok(())
            }
            SentenceRecord::Other(_) => Ok(()),
        }
    }

    fn apply_position(&mut self, gga: &PositionFix) {
        self.fix.update(|fix| {
            fix.latitude = gga.latitude;
            fix.longitude = gga.longitude;
            fix.altitude = gga.altitude.unwrap_or(0.0);
        });
    }

    fn apply_minimum_nav(&mut self, rmc: &MinimumNav) -> Result<()> {
        let timestamp = rmc
            .datetime
            .ok_or(GpsError::MissingField("RMC date/time"))?
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let speed_kmh = match rmc.speed_knots {
            Some(knots) if knots != 0.0 => knots * KNOTS_TO_KMH,
            _ => 0.0,
        };

        self.fix.update(|fix| {
            fix.timestamp = Some(timestamp);
            fix.latitude = rmc.latitude;
            fix.longitude = rmc.longitude;
            fix.speed_kmh = speed_kmh;
        });
        Ok(())
    }

    fn apply_satellites(&mut self, gsv: &SatelliteView) {
        let max = self.satellites.push(gsv.num_sv_in_view);
        self.fix.update(|fix| fix.satellites_in_view = max);
    }
}
