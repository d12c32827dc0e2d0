use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use geom::LonLat;
use osm_reader::ElementId;
use transit_model::City;

/// Validated cities and global transfers, reduced to the neutral shape the
/// per-format projections work from.
#[derive(Clone, Debug, Serialize)]
pub struct TransitData {
    /// Stop area id -> data, for every stop area participating in a route.
    pub stopareas: BTreeMap<String, StopAreaData>,
    /// City name -> network data.
    pub networks: BTreeMap<String, NetworkData>,
    /// Interchange pairs, lexicographically ordered within each pair; both
    /// endpoints are always present in `stopareas`.
    pub transfers: BTreeSet<(String, String)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StopAreaData {
    pub id: String,
    pub center: LonLat,
    pub name: String,
    pub int_name: Option<String>,
    pub entrances: Vec<EgressData>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EgressData {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub center: LonLat,
}

#[derive(Clone, Debug, Serialize)]
pub struct NetworkData {
    pub id: Option<i64>,
    pub name: String,
    pub routes: Vec<RouteData>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RouteData {
    pub id: String,
    pub mode: String,
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub name: Option<String>,
    pub colour: Option<String>,
    pub infill: Option<String>,
    pub itineraries: Vec<ItineraryData>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ItineraryData {
    pub id: String,
    pub tracks: Vec<LonLat>,
    pub start_time: Option<(u32, u32)>,
    pub end_time: Option<(u32, u32)>,
    pub interval: Option<u32>,
    pub stops: Vec<ItineraryStop>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ItineraryStop {
    pub stoparea_id: String,
    /// Meters from the start of the itinerary.
    pub distance: u64,
}

/// Projects the validated cities into the intermediate form. Only good
/// cities contribute; transfers are exploded into ordered pairs and
/// filtered to stop areas that made it in.
pub fn transit_to_dict(cities: &[City], transfers: &[BTreeSet<ElementId>]) -> TransitData {
    let mut data = TransitData {
        stopareas: BTreeMap::new(),
        networks: BTreeMap::new(),
        transfers: BTreeSet::new(),
    };

    for city in cities.iter().filter(|c| c.is_good()) {
        let mut network = NetworkData {
            id: city.id,
            name: city.name.clone(),
            routes: Vec::new(),
        };

        for route_master in city.routes.values() {
            let mut route_data = RouteData {
                id: route_master
                    .id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                mode: route_master.mode.clone().unwrap_or_default(),
                ref_: route_master.ref_.clone(),
                name: route_master.name.clone(),
                colour: route_master.colour.clone(),
                infill: route_master.infill.clone(),
                itineraries: Vec::new(),
            };

            for route in &route_master.routes {
                route_data.itineraries.push(ItineraryData {
                    id: route.id.to_string(),
                    tracks: route.get_tracks_geometry(),
                    start_time: route.start_time,
                    end_time: route.end_time,
                    interval: route.interval,
                    stops: route
                        .stops
                        .iter()
                        .map(|stop| ItineraryStop {
                            stoparea_id: stop.stoparea_id.to_string(),
                            distance: stop.distance,
                        })
                        .collect(),
                });

                // Store participating stop areas not seen before
                for stop in &route.stops {
                    let key = stop.stoparea_id.to_string();
                    if data.stopareas.contains_key(&key) {
                        continue;
                    }
                    let sa = &city.stop_areas[&stop.stoparea_id];
                    let entrances = sa
                        .entrances
                        .iter()
                        .chain(sa.exits.iter())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .filter_map(|egress_id| {
                            let el = city.elements.get(egress_id)?;
                            Some(EgressData {
                                id: egress_id.to_string(),
                                name: el.tags.get("name").cloned(),
                                ref_: el.tags.get("ref").cloned(),
                                center: el.center()?,
                            })
                        })
                        .collect();
                    data.stopareas.insert(
                        key.clone(),
                        StopAreaData {
                            id: key,
                            center: sa.center,
                            name: city.stations[&sa.station_id].name.clone(),
                            int_name: sa.int_name.clone(),
                            entrances,
                        },
                    );
                }
            }
            network.routes.push(route_data);
        }
        data.networks.insert(city.name.clone(), network);
    }

    for stoparea_set in transfers {
        let ids: Vec<&ElementId> = stoparea_set.iter().collect();
        for first in 0..ids.len().saturating_sub(1) {
            for second in first + 1..ids.len() {
                let id1 = ids[first].to_string();
                let id2 = ids[second].to_string();
                if data.stopareas.contains_key(&id1) && data.stopareas.contains_key(&id2) {
                    let pair = if id1 < id2 { (id1, id2) } else { (id2, id1) };
                    data.transfers.insert(pair);
                }
            }
        }
    }
    data
}
