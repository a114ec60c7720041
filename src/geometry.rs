//! Planar and great-circle geometry for claim validation
//!
//! Pure, stateless functions. Every function is total (degenerate input
//! yields `false` / `0.0` rather than a panic) and evaluates in input order
//! so results are reproducible bit for bit across platforms.
//!
//! Planar tests (`point_in_polygon`, `segments_intersect`,
//! `has_self_intersection`) treat longitude as X and latitude as Y. Claims
//! are a few hundred meters across, where the distortion of treating
//! degrees as a plane does not change crossing topology.
//!
//! ## Example
//!
//! ```
//! use territory_engine::geometry::{has_self_intersection, point_in_polygon};
//! use territory_engine::GeoPoint;
//!
//! let square = [
//!     GeoPoint::new(0.0, 0.0),
//!     GeoPoint::new(0.0, 1.0),
//!     GeoPoint::new(1.0, 1.0),
//!     GeoPoint::new(1.0, 0.0),
//! ];
//! assert!(point_in_polygon(GeoPoint::new(0.5, 0.5), &square));
//! assert!(!has_self_intersection(&square));
//! ```

use serde::{Deserialize, Serialize};

use crate::fix::GeoPoint;

/// Mean Earth radius used for every distance in the engine (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Axis-aligned lat/lon bounds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Inclusive overlap test
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.latitude)
            && (self.min_lon..=self.max_lon).contains(&p.longitude)
    }
}

/// Great-circle distance between two positions (meters)
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Great-circle distance between two points (meters)
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    haversine_meters(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Sum of consecutive great-circle distances along an open path (meters)
pub fn path_length_m(path: &[GeoPoint]) -> f64 {
    path.windows(2).map(|w| distance_m(w[0], w[1])).sum()
}

/// Even-odd ray casting test
///
/// Scans every edge `(ring[j], ring[(j + 1) % n])`. Rings with fewer than
/// three points contain nothing.
pub fn point_in_polygon(p: GeoPoint, ring: &[GeoPoint]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let (x, y) = (p.longitude, p.latitude);
    let mut inside = false;

    for j in 0..n {
        let a = ring[j];
        let b = ring[(j + 1) % n];
        let (xa, ya) = (a.longitude, a.latitude);
        let (xb, yb) = (b.longitude, b.latitude);

        // Edge straddles the horizontal ray through p
        if (ya > y) != (yb > y) {
            let x_cross = (xb - xa) * (y - ya) / (yb - ya) + xa;
            if x < x_cross {
                inside = !inside;
            }
        }
    }

    inside
}

/// Counter-clockwise orientation of the triple (a, b, c)
///
/// Collinear triples report `false`.
fn ccw(a: GeoPoint, b: GeoPoint, c: GeoPoint) -> bool {
    (c.latitude - a.latitude) * (b.longitude - a.longitude)
        > (b.latitude - a.latitude) * (c.longitude - a.longitude)
}

/// Proper crossing test for segments (a1, a2) and (b1, b2)
///
/// Uses orientation signs only, so no division and no epsilon. Segments
/// that merely share an endpoint may or may not report a crossing; callers
/// must skip adjacent segments themselves.
pub fn segments_intersect(a1: GeoPoint, a2: GeoPoint, b1: GeoPoint, b2: GeoPoint) -> bool {
    ccw(a1, b1, b2) != ccw(a2, b1, b2) && ccw(a1, a2, b1) != ccw(a1, a2, b2)
}

/// Does the walked path cross itself once closed back to its start?
///
/// The path is `n - 1` open segments plus the implicit closing segment
/// `path[n-1] -> path[0]`. Open segments are tested pairwise when not
/// adjacent; the closing segment is tested against every open segment
/// except the first and last, which share an endpoint with it.
pub fn has_self_intersection(path: &[GeoPoint]) -> bool {
    let n = path.len();
    if n < 4 {
        return false;
    }

    let segments = n - 1;
    for i in 0..segments {
        for j in (i + 2)..segments {
            if segments_intersect(path[i], path[i + 1], path[j], path[j + 1]) {
                return true;
            }
        }
    }

    let close_a = path[n - 1];
    let close_b = path[0];
    for i in 1..(segments - 1) {
        if segments_intersect(close_a, close_b, path[i], path[i + 1]) {
            return true;
        }
    }

    false
}

/// Project a point into meters relative to `center`
///
/// X and Y are great-circle distances along the parallel and the meridian
/// through the center, signed by direction.
fn project_local(center: GeoPoint, p: GeoPoint) -> (f64, f64) {
    let x = haversine_meters(center.latitude, center.longitude, center.latitude, p.longitude)
        * sign(p.longitude - center.longitude);
    let y = haversine_meters(center.latitude, center.longitude, p.latitude, center.longitude)
        * sign(p.latitude - center.latitude);
    (x, y)
}

fn sign(v: f64) -> f64 {
    if v < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Vertex centroid (arithmetic mean of coordinates)
pub fn centroid(points: &[GeoPoint]) -> GeoPoint {
    if points.is_empty() {
        return GeoPoint::default();
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.latitude).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.longitude).sum::<f64>() / n;
    GeoPoint::new(lat, lon)
}

/// Enclosed area of a ring in square meters
///
/// Projects to a local plane around the ring's centroid and applies the
/// shoelace formula. Returns 0 for fewer than three points.
pub fn polygon_area_sq_meters(ring: &[GeoPoint]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }

    let center = centroid(ring);
    let projected: Vec<(f64, f64)> = ring.iter().map(|&p| project_local(center, p)).collect();

    let mut twice_area = 0.0;
    for i in 0..n {
        let (x0, y0) = projected[i];
        let (x1, y1) = projected[(i + 1) % n];
        twice_area += x0 * y1 - x1 * y0;
    }

    twice_area.abs() / 2.0
}

/// Min/max bounds of a point set; all-zero for empty input
pub fn bounding_box(points: &[GeoPoint]) -> BoundingBox {
    let Some(first) = points.first() else {
        return BoundingBox::default();
    };

    points.iter().skip(1).fold(
        BoundingBox {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lon: first.longitude,
            max_lon: first.longitude,
        },
        |b, p| BoundingBox {
            min_lat: b.min_lat.min(p.latitude),
            max_lat: b.max_lat.max(p.latitude),
            min_lon: b.min_lon.min(p.longitude),
            max_lon: b.max_lon.max(p.longitude),
        },
    )
}
