use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Serialize;

use geom::LonLat;
use osm_reader::{Element, ElementData, ElementId, ElementKind};
use transit_model::{City, StopArea};

use crate::{format_colour, DEFAULT_INTERVAL, KMPH_TO_MPS, SPEED_ON_TRANSFER, TRANSFER_PENALTY};

/// Extra seconds any entrance costs on top of the walk.
pub const ENTRANCE_PENALTY: u64 = 60; // seconds
/// Walking speed to an entrance, m/s.
pub const SPEED_TO_ENTRANCE: f64 = 5.0 * KMPH_TO_MPS;
/// Assumed vehicle speed for stop-to-stop times, m/s.
pub const SPEED_ON_LINE: f64 = 40.0 * KMPH_TO_MPS;

/// A stable collision-free 64-bit id: the OSM id shifted left twice with
/// the type code in between.
pub fn uid(id: ElementId) -> u64 {
    let type_code = match id.kind {
        ElementKind::Node => 0,
        ElementKind::Way => 2,
        ElementKind::Relation => 3,
    };
    ((((id.id as u64) << 2) + type_code) << 1) as u64
}

/// Route relations skip the type code; they live in their own id space.
fn route_uid(id: ElementId) -> u64 {
    (id.id as u64) << 1
}

#[derive(Serialize)]
pub struct RoutingData {
    pub stops: Vec<RoutingStop>,
    /// (uid1, uid2, seconds) with uid1 < uid2.
    pub transfers: Vec<(u64, u64, u64)>,
    pub networks: Vec<RoutingNetwork>,
}

#[derive(Serialize)]
pub struct RoutingStop {
    pub name: String,
    pub int_name: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub osm_type: &'static str,
    pub osm_id: i64,
    pub id: u64,
    pub entrances: Vec<RoutingEgress>,
    pub exits: Vec<RoutingEgress>,
}

#[derive(Serialize)]
pub struct RoutingEgress {
    pub osm_type: &'static str,
    pub osm_id: i64,
    pub lon: f64,
    pub lat: f64,
    /// Travel-time penalty in seconds, not meters.
    pub distance: u64,
}

#[derive(Serialize)]
pub struct RoutingNetwork {
    pub network: String,
    pub routes: Vec<RoutingRoute>,
    pub agency_id: Option<i64>,
}

#[derive(Serialize)]
pub struct RoutingRoute {
    #[serde(rename = "type")]
    pub mode: String,
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub name: Option<String>,
    pub colour: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub casing: Option<String>,
    pub route_id: u64,
    pub itineraries: Vec<RoutingItinerary>,
}

#[derive(Serialize)]
pub struct RoutingItinerary {
    /// (stop area uid, seconds from the start).
    pub stops: Vec<(u64, u64)>,
    pub interval: u64,
}

fn egress_penalty(from: LonLat, to: LonLat) -> u64 {
    ENTRANCE_PENALTY + (from.gps_dist_meters(to) / SPEED_TO_ENTRANCE).round() as u64
}

/// Picks well-spread nodes of a platform to serve as makeshift exits: the
/// first node sets the spacing at 2/3 of its distance to the center, and
/// nodes closer than that to an already chosen exit are dropped.
fn find_exits_for_platform<'a>(center: LonLat, nodes: Vec<&'a Element>) -> Vec<&'a Element> {
    let mut exits: Vec<&Element> = Vec::new();
    let mut min_distance: Option<f64> = None;
    for n in nodes {
        let pt = match n.center() {
            Some(pt) => pt,
            None => continue,
        };
        let d = center.gps_dist_meters(pt);
        match min_distance {
            None => min_distance = Some(d * 2.0 / 3.0),
            Some(min_d) if d < min_d => continue,
            _ => {}
        }
        let too_close = exits.iter().any(|e| {
            e.center()
                .map(|ept| ept.gps_dist_meters(pt) < min_distance.unwrap_or(0.0))
                .unwrap_or(false)
        });
        if !too_close {
            exits.push(n);
        }
    }
    exits
}

/// Nodes making up a platform element: the node itself, a way's nodes, or
/// the nodes of a relation's member ways.
fn platform_element_nodes<'a>(pl_el: &'a Element, city: &'a City) -> Vec<&'a Element> {
    match &pl_el.data {
        ElementData::Node { .. } => vec![pl_el],
        ElementData::Way { nodes } => nodes
            .iter()
            .filter_map(|n| city.elements.get(&ElementId::node(*n)))
            .collect(),
        ElementData::Relation { members } => members
            .iter()
            .filter(|m| m.kind == ElementKind::Way)
            .filter_map(|m| city.elements.get(&m.element_id()))
            .flat_map(|way| {
                way.nodes()
                    .iter()
                    .filter_map(|n| city.elements.get(&ElementId::node(*n)))
            })
            .collect(),
    }
}

/// Builds the routing JSON model from validated cities and the global
/// transfer list.
pub fn transit_data_to_routing(
    cities: &[City],
    transfers: &[BTreeSet<ElementId>],
) -> RoutingData {
    let mut stop_areas: BTreeMap<ElementId, (&StopArea, &City)> = BTreeMap::new();
    let mut networks = Vec::new();
    let mut platform_nodes: BTreeMap<ElementId, Vec<&Element>> = BTreeMap::new();

    for city in cities.iter().filter(|c| c.is_good()) {
        let mut network = RoutingNetwork {
            network: city.name.clone(),
            routes: Vec::new(),
            agency_id: city.id,
        };
        for route_master in city.routes.values() {
            let mut colour = format_colour(route_master.colour.as_ref());
            let mut casing = None;
            if route_master.infill.is_some() {
                casing = colour;
                colour = format_colour(route_master.infill.as_ref());
            }
            let mut routes = RoutingRoute {
                mode: route_master.mode.clone().unwrap_or_default(),
                ref_: route_master.ref_.clone(),
                name: route_master.name.clone(),
                colour,
                casing,
                route_id: route_master.id.map(route_uid).unwrap_or_default(),
                itineraries: Vec::new(),
            };
            for variant in &route_master.routes {
                let mut itin = Vec::new();
                for stop in &variant.stops {
                    let sa = &city.stop_areas[&stop.stoparea_id];
                    stop_areas.insert(sa.id, (sa, city));
                    itin.push((
                        uid(sa.id),
                        (stop.distance as f64 / SPEED_ON_LINE).round() as u64,
                    ));
                    // Make exits from platform nodes if we don't have
                    // proper exits
                    if sa.entrances.is_empty() && sa.exits.is_empty() {
                        for pl in &sa.platforms {
                            if platform_nodes.contains_key(pl) {
                                continue;
                            }
                            let pl_el = &city.elements[pl];
                            let nodes = platform_element_nodes(pl_el, city);
                            let center = sa.centers.get(pl).copied().unwrap_or(sa.center);
                            platform_nodes.insert(*pl, find_exits_for_platform(center, nodes));
                        }
                    }
                }
                routes.itineraries.push(RoutingItinerary {
                    stops: itin,
                    interval: variant.interval.map(|x| x as u64).unwrap_or(DEFAULT_INTERVAL),
                });
            }
            network.routes.push(routes);
        }
        networks.push(network);
    }

    let mut stops: BTreeMap<ElementId, RoutingStop> = BTreeMap::new();
    for (stop_id, (sa, _city)) in &stop_areas {
        let mut st = RoutingStop {
            name: sa.name.clone(),
            int_name: sa.int_name.clone(),
            lat: sa.center.lat,
            lon: sa.center.lon,
            osm_type: sa.station_id.kind.name(),
            osm_id: sa.station_id.id,
            id: uid(sa.id),
            entrances: Vec::new(),
            exits: Vec::new(),
        };

        for (egress_set, target) in [(&sa.entrances, 0), (&sa.exits, 1)] {
            for e in egress_set {
                if e.kind != ElementKind::Node {
                    continue;
                }
                let center = match sa.centers.get(e) {
                    Some(c) => *c,
                    None => continue,
                };
                let egress = RoutingEgress {
                    osm_type: "node",
                    osm_id: e.id,
                    lon: center.lon,
                    lat: center.lat,
                    distance: egress_penalty(center, sa.center),
                };
                if target == 0 {
                    st.entrances.push(egress);
                } else {
                    st.exits.push(egress);
                }
            }
        }

        if sa.entrances.is_empty() && sa.exits.is_empty() {
            if !sa.platforms.is_empty() {
                for pl in &sa.platforms {
                    for n in platform_nodes.get(pl).map(|v| v.as_slice()).unwrap_or(&[]) {
                        if let Some(pt) = n.center() {
                            for target in [0, 1] {
                                let egress = RoutingEgress {
                                    osm_type: n.id.kind.name(),
                                    osm_id: n.id.id,
                                    lon: pt.lon,
                                    lat: pt.lat,
                                    distance: egress_penalty(pt, sa.center),
                                };
                                if target == 0 {
                                    st.entrances.push(egress);
                                } else {
                                    st.exits.push(egress);
                                }
                            }
                        }
                    }
                }
            } else {
                let center = sa.centers.get(&sa.id).copied().unwrap_or(sa.center);
                for target in [0, 1] {
                    let egress = RoutingEgress {
                        osm_type: sa.station_id.kind.name(),
                        osm_id: sa.station_id.id,
                        lon: center.lon,
                        lat: center.lat,
                        distance: ENTRANCE_PENALTY,
                    };
                    if target == 0 {
                        st.entrances.push(egress);
                    } else {
                        st.exits.push(egress);
                    }
                }
            }
        }

        stops.insert(*stop_id, st);
    }

    let mut pairwise_transfers: BTreeMap<(u64, u64), u64> = BTreeMap::new();
    for stoparea_id_set in transfers {
        let ids: Vec<&ElementId> = stoparea_id_set.iter().collect();
        for first in 0..ids.len().saturating_sub(1) {
            for second in first + 1..ids.len() {
                let (id1, id2) = (ids[first], ids[second]);
                if !stops.contains_key(id1) || !stops.contains_key(id2) {
                    continue;
                }
                let mut uid1 = uid(*id1);
                let mut uid2 = uid(*id2);
                if uid1 > uid2 {
                    std::mem::swap(&mut uid1, &mut uid2);
                }
                let transfer_time = TRANSFER_PENALTY
                    + (stop_areas[id1]
                        .0
                        .center
                        .gps_dist_meters(stop_areas[id2].0.center)
                        / SPEED_ON_TRANSFER)
                        .round() as u64;
                pairwise_transfers.insert((uid1, uid2), transfer_time);
            }
        }
    }

    RoutingData {
        stops: stops.into_values().collect(),
        transfers: pairwise_transfers
            .into_iter()
            .map(|((uid1, uid2), time)| (uid1, uid2, time))
            .collect(),
        networks,
    }
}

/// Generates the routing JSON and saves it to a file.
pub fn process(
    cities: &[City],
    transfers: &[BTreeSet<ElementId>],
    filename: &str,
) -> Result<()> {
    let filename = if filename.to_lowercase().ends_with("json") {
        filename.to_string()
    } else {
        format!("{}.json", filename)
    };
    let routing = transit_data_to_routing(cities, transfers);
    fs_err::write(&filename, serde_json::to_vec_pretty(&routing)?)?;
    info!(
        "Wrote routing data for {} networks to {}",
        routing.networks.len(),
        filename
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_bit_layout() {
        assert_eq!(uid(ElementId::node(5)), (5 << 2) << 1);
        assert_eq!(uid(ElementId::way(5)), ((5 << 2) + 2) << 1);
        assert_eq!(uid(ElementId::relation(5)), ((5 << 2) + 3) << 1);
        // All three kinds of one numeric id stay distinct
        let ids = [
            uid(ElementId::node(42)),
            uid(ElementId::way(42)),
            uid(ElementId::relation(42)),
        ];
        assert_eq!(ids.iter().collect::<BTreeSet<_>>().len(), 3);
        // Route ids skip the type code
        assert_eq!(route_uid(ElementId::relation(7)), 14);
    }
}
