//! The transit network model: typed stations, stop areas, routes, route
//! masters and interchanges reconstructed from untyped OSM elements, and the
//! per-city validator that checks the network against its reference counts
//! and structural invariants.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

use std::collections::BTreeSet;
use std::fmt;

mod city;
mod colours;
mod recovery;
mod route;
mod route_master;
mod route_stop;
mod station;
mod stop_area;
mod validation;

pub use crate::city::{Bbox, City, CityRow, ValidationResult};
pub use crate::colours::normalize_colour;
pub use crate::recovery::{CityRecoveryData, RecoveryItinerary, RecoveryStation};
pub use crate::route::{osm_interval_to_seconds, parse_time_range, Route};
pub use crate::route_master::RouteMaster;
pub use crate::route_stop::{ActualRole, RouteStop};
pub use crate::station::Station;
pub use crate::stop_area::{StopArea, MAX_DISTANCE_TO_ENTRANCES};
pub use crate::validation::{
    add_osm_elements_to_cities, find_transfers, validate_cities, Severity, ValidationLog,
    ValidationMessage,
};

/// If an object has moved less than this between validator runs, it is
/// likely still the same object. In meters.
pub const DISPLACEMENT_TOLERANCE: f64 = 300.0;

pub const MODES_RAPID: [&str; 4] = ["subway", "light_rail", "monorail", "train"];
pub const MODES_OVERGROUND: [&str; 5] = ["tram", "bus", "trolleybus", "aerialway", "ferry"];
pub const DEFAULT_MODES_RAPID: [&str; 2] = ["subway", "light_rail"];
pub const DEFAULT_MODES_OVERGROUND: [&str; 1] = ["tram"];

pub const RAILWAY_TYPES: [&str; 7] = [
    "rail",
    "light_rail",
    "subway",
    "narrow_gauge",
    "funicular",
    "monorail",
    "tram",
];

pub const CONSTRUCTION_KEYS: [&str; 4] = [
    "construction",
    "proposed",
    "construction:railway",
    "proposed:railway",
];

pub fn all_modes() -> impl Iterator<Item = &'static str> {
    MODES_RAPID.into_iter().chain(MODES_OVERGROUND)
}

pub fn default_modes_rapid() -> BTreeSet<String> {
    DEFAULT_MODES_RAPID.iter().map(|m| m.to_string()).collect()
}

pub fn default_modes_overground() -> BTreeSet<String> {
    DEFAULT_MODES_OVERGROUND
        .iter()
        .map(|m| m.to_string())
        .collect()
}

/// An error that prevents further validation of one city. It invalidates
/// the city but never crosses city boundaries.
#[derive(Debug)]
pub struct CriticalValidationError(pub String);

impl fmt::Display for CriticalValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CriticalValidationError {}
