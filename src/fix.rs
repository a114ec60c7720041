//! Position samples
//!
//! Value types for a single WGS-84 position and for one raw or filtered
//! position fix as delivered by the host's location source.

use serde::{Deserialize, Serialize};

use crate::geometry::EARTH_RADIUS_M;

/// A WGS-84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees (positive = North)
    pub latitude: f64,
    /// Longitude in degrees (positive = East)
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Point displaced by `east_m` / `north_m` meters on the sphere
    ///
    /// Inverse of the local projection used by the area computation, so a
    /// shape laid out in meters around an origin keeps its dimensions.
    pub fn offset_m(&self, east_m: f64, north_m: f64) -> Self {
        let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
        let dlon = (east_m / (EARTH_RADIUS_M * self.latitude.to_radians().cos())).to_degrees();
        Self::new(self.latitude + dlat, self.longitude + dlon)
    }
}

/// One position sample
///
/// `horizontal_accuracy_m <= 0` means the receiver did not report an
/// accuracy; such samples are never trusted. `speed_mps < 0` means speed
/// is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub point: GeoPoint,
    /// Altitude above the ellipsoid (meters)
    pub altitude_m: f64,
    /// Horizontal 1-sigma accuracy (meters)
    pub horizontal_accuracy_m: f64,
    /// Ground speed (m/s)
    pub speed_mps: f64,
    /// Monotonic timestamp (milliseconds)
    pub timestamp_ms: u64,
}

impl Fix {
    /// Fix without altitude information
    pub fn new(point: GeoPoint, horizontal_accuracy_m: f64, speed_mps: f64, timestamp_ms: u64) -> Self {
        Self {
            point,
            altitude_m: 0.0,
            horizontal_accuracy_m,
            speed_mps,
            timestamp_ms,
        }
    }

    /// True when the receiver reported a usable accuracy
    pub fn has_accuracy(&self) -> bool {
        self.horizontal_accuracy_m > 0.0
    }

    pub fn has_speed(&self) -> bool {
        self.speed_mps >= 0.0
    }
}
