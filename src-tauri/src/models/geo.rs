//! Geographic primitives shared by the controller, the session and the UI.

use serde::{Deserialize, Serialize};

/// Longitude/latitude pair in degrees, in MapLibre's `[lng, lat]` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// True when both components are finite and inside the WGS84 ranges.
    pub fn is_valid(self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && self.lng.abs() <= 180.0
            && self.lat.abs() <= 90.0
    }
}

/// One fix from a location source.
///
/// Only the most recent sample matters; nothing keeps a history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub longitude: f64,
    pub latitude: f64,
    /// Unix timestamp in ms. Producers that omit it get "now".
    #[serde(default = "now_ms")]
    pub timestamp_ms: i64,
}

impl LocationSample {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            timestamp_ms: now_ms(),
        }
    }

    pub fn position(&self) -> LngLat {
        LngLat::new(self.longitude, self.latitude)
    }

    pub fn is_valid(&self) -> bool {
        self.position().is_valid()
    }
}

impl From<LngLat> for LocationSample {
    fn from(value: LngLat) -> Self {
        Self::new(value.lng, value.lat)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
