//! Output builders: a neutral intermediate form of the validated transit
//! data, and its projections to a GTFS feed and to the routing JSON used by
//! the map client.

#[macro_use]
extern crate log;

pub mod gtfs;
pub mod routing;
mod transit_data;

pub use crate::transit_data::{
    transit_to_dict, EgressData, ItineraryData, ItineraryStop, NetworkData, RouteData,
    StopAreaData, TransitData,
};

pub const KMPH_TO_MPS: f64 = 1.0 / 3.6;
/// Walking speed between interchange stations, m/s.
pub const SPEED_ON_TRANSFER: f64 = 3.5 * KMPH_TO_MPS;
pub const TRANSFER_PENALTY: u64 = 30; // seconds
/// Assumed headway when a route declares none, seconds.
pub const DEFAULT_INTERVAL: u64 = 150;

/// Truncates the leading # sign.
pub fn format_colour(colour: Option<&String>) -> Option<String> {
    colour.map(|c| c.trim_start_matches('#').to_string())
}
