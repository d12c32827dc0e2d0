//! Longitude/latitude geometry for transit networks: great-circle distance
//! approximation, projection of points onto rail polylines, and path length
//! along a polyline. All distances are in meters, all angles in degrees.

use std::fmt;

use serde::{Deserialize, Serialize};

mod projection;

pub use crate::projection::{
    distance_on_line, find_segment, project_on_line, project_on_segment, LineProjection,
};

pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// How far a stop may be from the route's tracks and still be considered to
/// lie on them, in meters.
pub const MAX_DISTANCE_STOP_TO_LINE: f64 = 50.0;

/// A longitude/latitude point. Serializes as a `[lon, lat]` pair, which is
/// the form all our inputs and outputs use.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> LonLat {
        LonLat { lon, lat }
    }

    /// Equirectangular approximation, good enough at city scale.
    pub fn gps_dist_meters(self, other: LonLat) -> f64 {
        let dx = (self.lon - other.lon).to_radians()
            * (0.5 * (self.lat + other.lat).to_radians()).cos();
        let dy = (self.lat - other.lat).to_radians();
        EARTH_RADIUS_METERS * (dx * dx + dy * dy).sqrt()
    }

    /// True if the two points coincide up to coordinate noise.
    pub fn is_near(self, other: LonLat) -> bool {
        (self.lon - other.lon).abs() <= 1e-8 && (self.lat - other.lat).abs() <= 1e-8
    }

    /// Average of a non-empty set of points.
    pub fn center(pts: &[LonLat]) -> LonLat {
        let mut lon = 0.0;
        let mut lat = 0.0;
        for pt in pts {
            lon += pt.lon;
            lat += pt.lat;
        }
        let len = pts.len() as f64;
        LonLat::new(lon / len, lat / len)
    }
}

impl From<(f64, f64)> for LonLat {
    fn from((lon, lat): (f64, f64)) -> LonLat {
        LonLat::new(lon, lat)
    }
}

impl From<LonLat> for (f64, f64) {
    fn from(pt: LonLat) -> (f64, f64) {
        (pt.lon, pt.lat)
    }
}

impl fmt::Display for LonLat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.lon, self.lat)
    }
}

/// The angle at `c` formed by `p1` and `p2`, as a rounded number of degrees
/// in [0, 180]. Small angles mean the three stops double back on themselves.
pub fn angle_between(p1: LonLat, c: LonLat, p2: LonLat) -> i32 {
    let a = ((p1.lat - c.lat).atan2(p1.lon - c.lon) - (p2.lat - c.lat).atan2(p2.lon - c.lon))
        .to_degrees()
        .abs()
        .round() as i32;
    if a <= 180 {
        a
    } else {
        360 - a
    }
}
