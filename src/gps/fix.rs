// src/gps/fix.rs
//! The consolidated fix and its shared, lock-guarded handle

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Health of the serial link, independent of whether the receiver has a fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkStatus {
    #[default]
    #[serde(rename = "not connected")]
    NotConnected,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "fail connect")]
    FailedConnect,
    #[serde(rename = "exception")]
    Exception,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkStatus::NotConnected => "not connected",
            LinkStatus::Connected => "connected",
            LinkStatus::FailedConnect => "fail connect",
            LinkStatus::Exception => "exception",
        };
        f.write_str(s)
    }
}

/// Latest known GPS state.
///
/// Latitude and longitude use 0.0 for "unknown", so a real position on the
/// equator or prime meridian is indistinguishable from no data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: Option<String>, // "YYYY-MM-DD HH:MM:SS", from RMC
    #[serde(rename = "speed")]
    pub speed_kmh: f64,
    pub altitude: f64,
    #[serde(rename = "satellites")]
    pub satellites_in_view: u32,
    pub status: LinkStatus,
}

impl Fix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a position has been reported at all
    pub fn has_position(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0
    }
}

/// Read access to the current fix.
///
/// Implementations return a copy taken at one instant, never a view that
/// mixes two record applications.
pub trait FixQuery {
    fn get_fix(&self) -> Fix;
}

/// The single fix shared between the ingestion task and the query server.
///
/// Cloning the handle shares the same fix. Writers are crate-private:
/// status belongs to the link supervisor, every other field to the
/// aggregator.
#[derive(Debug, Clone, Default)]
pub struct SharedFix {
    inner: Arc<RwLock<Fix>>,
}

impl SharedFix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one update under the write lock.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Fix) -> R) -> R {
        // Poisoning is ignored: every Fix value is structurally valid.
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub(crate) fn set_status(&self, status: LinkStatus) {
        self.update(|fix| fix.status = status);
    }

    pub fn status(&self) -> LinkStatus {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).status
    }
}

impl FixQuery for SharedFix {
    fn get_fix(&self) -> Fix {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_initial_fix() {
        let fix = SharedFix::new().get_fix();
        assert_eq!(fix.status, LinkStatus::NotConnected);
        assert_eq!(fix.timestamp, None);
        assert_eq!(fix.satellites_in_view, 0);
        assert!(!fix.has_position());
    }

    #[test]
    fn test_serialized_shape() {
        let fix = Fix {
            latitude: 31.5,
            longitude: 117.25,
            timestamp: Some("2026-10-19 08:30:15".to_string()),
            speed_kmh: 18.52,
            altitude: 35.2,
            satellites_in_view: 9,
            status: LinkStatus::FailedConnect,
        };

        let value = serde_json::to_value(&fix).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "latitude": 31.5,
                "longitude": 117.25,
                "timestamp": "2026-10-19 08:30:15",
                "speed": 18.52,
                "altitude": 35.2,
                "satellites": 9,
                "status": "fail connect"
            })
        );

        let empty = serde_json::to_value(Fix::new()).unwrap();
        assert_eq!(empty["timestamp"], serde_json::Value::Null);
        assert_eq!(empty["status"], "not connected");
    }

    #[test]
    fn test_handles_share_one_fix() {
        let fix = SharedFix::new();
        let other = fix.clone();

        fix.set_status(LinkStatus::Connected);
        assert_eq!(other.status(), LinkStatus::Connected);
        assert_eq!(other.get_fix().status, LinkStatus::Connected);
    }

    #[test]
    fn test_snapshots_never_mix_updates() {
        let fix = SharedFix::new();

        let writer = {
            let fix = fix.clone();
            thread::spawn(move || {
                for i in 0..20_000u32 {
                    let v = f64::from(i % 2 + 1);
                    fix.update(|f| {
                        f.latitude = v;
                        f.longitude = v;
                        f.altitude = v;
                        f.satellites_in_view = i % 2 + 1;
                    });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let fix = fix.clone();
                thread::spawn(move || {
                    for _ in 0..20_000 {
                        let snap = fix.get_fix();
                        assert_eq!(snap.latitude, snap.longitude);
                        assert_eq!(snap.latitude, snap.altitude);
                        assert_eq!(snap.altitude, f64::from(snap.satellites_in_view));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
