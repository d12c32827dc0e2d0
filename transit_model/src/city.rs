use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Serialize;

use osm_reader::{Element, ElementId, ElementKind};

use crate::recovery::CityRecoveryData;
use crate::route::{Route, RouteContext};
use crate::route_master::RouteMaster;
use crate::station::Station;
use crate::stop_area::StopArea;
use crate::validation::ValidationLog;
use crate::{default_modes_overground, default_modes_rapid};

/// Allowed mismatch between found and expected station count, as a part of
/// the total.
const ALLOWED_STATIONS_MISMATCH: f64 = 0.02;
/// Same for interchanges.
const ALLOWED_TRANSFERS_MISMATCH: f64 = 0.07;

/// A geographic bounding box, parsed from the cities table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bbox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Bbox {
    /// Four comma-separated numbers: minlat, minlon, maxlat, maxlon.
    pub fn parse(s: &str) -> Option<Bbox> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|x| x.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if parts.len() != 4 {
            return None;
        }
        Some(Bbox {
            min_lat: parts[0],
            min_lon: parts[1],
            max_lat: parts[2],
            max_lon: parts[3],
        })
    }

    pub fn contains(&self, pt: geom::LonLat) -> bool {
        self.min_lat <= pt.lat
            && pt.lat <= self.max_lat
            && self.min_lon <= pt.lon
            && pt.lon <= self.max_lon
    }

    /// The Overpass bbox filter order: south, west, north, east.
    pub fn overpass_format(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

/// One row of the cities table, as raw strings. Rapid-transit tables carry
/// the station/line/interchange counts; overground tables carry the
/// per-mode line counts instead.
#[derive(Clone, Debug, Default)]
pub struct CityRow {
    pub id: String,
    pub name: String,
    pub country: String,
    pub continent: String,
    pub num_stations: String,
    pub num_lines: String,
    pub num_light_lines: String,
    pub num_interchanges: String,
    pub num_tram_lines: String,
    pub num_trolleybus_lines: String,
    pub num_bus_lines: String,
    pub num_other_lines: String,
    pub bbox: String,
    pub networks: String,
}

/// The validation outcome of one city, written to the JSON log. Rapid
/// cities report subway/light-rail lines; overground cities report the
/// per-mode line counts instead.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationResult {
    pub name: String,
    pub country: String,
    pub continent: String,
    pub stations_found: usize,
    pub transfers_found: usize,
    pub unused_entrances: usize,
    pub networks: usize,
    pub stations_expected: i64,
    pub transfers_expected: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subwayl_expected: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lightrl_expected: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subwayl_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lightrl_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traml_expected: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trolleybusl_expected: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busl_expected: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otherl_expected: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traml_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trolleybusl_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busl_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otherl_found: Option<usize>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub notices: Vec<String>,
}

/// The top-level aggregate: a city's descriptor, its slice of the OSM data,
/// and everything reconstructed from it.
pub struct City {
    pub id: Option<i64>,
    pub name: String,
    pub country: String,
    pub continent: String,
    pub overground: bool,
    pub num_stations: i64,
    pub num_lines: i64,
    pub num_light_lines: i64,
    pub num_interchanges: i64,
    pub num_tram_lines: i64,
    pub num_trolleybus_lines: i64,
    pub num_bus_lines: i64,
    pub num_other_lines: i64,
    pub networks: BTreeSet<String>,
    pub modes: BTreeSet<String>,
    pub bbox: Option<Bbox>,

    pub elements: BTreeMap<ElementId, Element>,
    pub stations: BTreeMap<ElementId, Station>,
    pub stop_areas: BTreeMap<ElementId, StopArea>,
    /// Element id -> ids of stop areas containing it.
    pub stations_by_element: BTreeMap<ElementId, Vec<ElementId>>,
    /// Route relation id -> its route_master relation id.
    pub masters: BTreeMap<ElementId, ElementId>,
    /// Member element id -> hosting stop_area relation ids.
    pub stop_area_rels: BTreeMap<ElementId, Vec<ElementId>>,
    /// Keyed by the master relation id, or by ref for masterless lines.
    pub routes: BTreeMap<String, RouteMaster>,
    /// Sets of stop area ids forming interchanges within this city.
    pub transfers: Vec<BTreeSet<ElementId>>,
    pub station_ids: BTreeSet<ElementId>,
    stops_and_platforms: BTreeSet<ElementId>,
    pub recovery_data: Option<CityRecoveryData>,

    pub log: ValidationLog,
    validate_called: bool,
    pub found_stations: usize,
    pub found_interchanges: usize,
    pub found_lines: usize,
    pub found_light_lines: usize,
    pub found_tram_lines: usize,
    pub found_bus_lines: usize,
    pub found_trolleybus_lines: usize,
    pub found_other_lines: usize,
    pub found_networks: usize,
    pub unused_entrances: usize,
    pub entrances_not_in_stop_areas: usize,
    /// Entrance nodes that serve some station, aggregated by the caller for
    /// the unused-entrances export.
    pub used_entrances: BTreeSet<ElementId>,
}

fn format_elid_list(ids: &BTreeSet<ElementId>) -> String {
    let mut msg = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>();
    msg.sort();
    let mut result = msg[..msg.len().min(20)].join(", ");
    if msg.len() > 20 {
        result.push_str(", ...");
    }
    result
}

impl City {
    pub fn new(row: CityRow, overground: bool) -> City {
        let mut log = ValidationLog::new();

        let id = match row.id.parse::<i64>() {
            Ok(x) => Some(x),
            Err(_) => {
                log.error(
                    format!(
                        "Configuration error: wrong value for id: {}",
                        if row.id.is_empty() { "<empty>" } else { &row.id }
                    ),
                    None,
                );
                None
            }
        };

        let mut fill_int = |attr: &str, value: &str, default: Option<i64>| -> i64 {
            if value.is_empty() {
                if let Some(d) = default {
                    return d;
                }
            }
            match value.parse::<i64>() {
                Ok(x) => x,
                Err(_) => {
                    let print_value = if value.is_empty() { "<empty>" } else { value };
                    log.error(
                        format!("Configuration error: wrong value for {}: {}", attr, print_value),
                        None,
                    );
                    0
                }
            }
        };
        let mut num_stations = 0;
        let mut num_lines = 0;
        let mut num_light_lines = 0;
        let mut num_interchanges = 0;
        let mut num_tram_lines = 0;
        let mut num_trolleybus_lines = 0;
        let mut num_bus_lines = 0;
        let mut num_other_lines = 0;
        if overground {
            num_tram_lines = fill_int("num_tram_lines", &row.num_tram_lines, Some(0));
            num_trolleybus_lines =
                fill_int("num_trolleybus_lines", &row.num_trolleybus_lines, Some(0));
            num_bus_lines = fill_int("num_bus_lines", &row.num_bus_lines, Some(0));
            num_other_lines = fill_int("num_other_lines", &row.num_other_lines, Some(0));
        } else {
            num_stations = fill_int("num_stations", &row.num_stations, None);
            num_lines = fill_int("num_lines", &row.num_lines, Some(0));
            num_light_lines = fill_int("num_light_lines", &row.num_light_lines, Some(0));
            num_interchanges = fill_int("num_interchanges", &row.num_interchanges, Some(0));
        }

        // The networks column is MODES:NETWORKS, split on every colon: the
        // modes half is the first token, the network names half is the
        // last. Any tokens in between are discarded. Either half may be
        // empty.
        let tokens: Vec<&str> = if row.networks.is_empty() {
            Vec::new()
        } else {
            row.networks.split(':').collect()
        };
        let networks: BTreeSet<String> = match tokens.last() {
            Some(last) if !last.is_empty() => last
                .split(';')
                .map(|x| x.trim())
                .filter(|x| !x.is_empty())
                .map(|x| x.to_string())
                .collect(),
            _ => BTreeSet::new(),
        };
        let modes: BTreeSet<String> = if tokens.len() < 2 || tokens[0].is_empty() {
            if overground {
                default_modes_overground()
            } else {
                default_modes_rapid()
            }
        } else {
            tokens[0].split(',').map(|x| x.trim().to_string()).collect()
        };

        let bbox = Bbox::parse(&row.bbox);
        if bbox.is_none() {
            log.error(
                format!("Configuration error: wrong value for bbox: {}", row.bbox),
                None,
            );
        }

        City {
            id,
            name: row.name,
            country: row.country,
            continent: row.continent,
            overground,
            num_stations,
            num_lines,
            num_light_lines,
            num_interchanges,
            num_tram_lines,
            num_trolleybus_lines,
            num_bus_lines,
            num_other_lines,
            networks,
            modes,
            bbox,
            elements: BTreeMap::new(),
            stations: BTreeMap::new(),
            stop_areas: BTreeMap::new(),
            stations_by_element: BTreeMap::new(),
            masters: BTreeMap::new(),
            stop_area_rels: BTreeMap::new(),
            routes: BTreeMap::new(),
            transfers: Vec::new(),
            station_ids: BTreeSet::new(),
            stops_and_platforms: BTreeSet::new(),
            recovery_data: None,
            log,
            validate_called: false,
            found_stations: 0,
            found_interchanges: 0,
            found_lines: 0,
            found_light_lines: 0,
            found_tram_lines: 0,
            found_bus_lines: 0,
            found_trolleybus_lines: 0,
            found_other_lines: 0,
            found_networks: 0,
            unused_entrances: 0,
            entrances_not_in_stop_areas: 0,
            used_entrances: BTreeSet::new(),
        }
    }

    pub fn contains(&self, el: &Element) -> bool {
        match (self.bbox, el.center()) {
            (Some(bbox), Some(center)) => bbox.contains(center),
            _ => false,
        }
    }

    /// Registers an element with the city, maintaining the master and
    /// stop_area indexes as relations come in.
    pub fn add(&mut self, el: &Element) {
        if el.id.kind == ElementKind::Relation && el.members().is_empty() {
            return;
        }
        self.elements.insert(el.id, el.clone());
        if el.id.kind != ElementKind::Relation || el.tags.is_empty() {
            return;
        }

        if el.tags.is("type", "route_master") {
            for m in el.members() {
                if m.kind != ElementKind::Relation {
                    continue;
                }
                let member_id = m.element_id();
                if self.masters.contains_key(&member_id) {
                    self.log.error_for_id("Route in two route_masters", member_id);
                }
                self.masters.insert(member_id, el.id);
            }
        } else if el.tags.is("public_transport", "stop_area") {
            if !el.tags.is("type", "public_transport") {
                self.log.warn(
                    format!(
                        "stop_area relation with type={}, needed type=public_transport",
                        el.tags.get("type").cloned().unwrap_or_default()
                    ),
                    Some(el),
                );
                return;
            }
            let mut warned_about_duplicates = false;
            for m in el.members() {
                let rels = self.stop_area_rels.entry(m.element_id()).or_default();
                if rels.contains(&el.id) {
                    if !warned_about_duplicates {
                        self.log.warn("Duplicate element in a stop area", Some(el));
                        warned_about_duplicates = true;
                    }
                } else {
                    rels.push(el.id);
                }
            }
        }
    }

    /// Builds stations, stop areas, routes, route masters and the city's
    /// own interchanges from the registered elements.
    pub fn extract_routes(&mut self) -> Result<()> {
        let ids: Vec<ElementId> = self.elements.keys().copied().collect();

        // Stations and their stop areas
        let mut processed_stop_areas: BTreeSet<ElementId> = BTreeSet::new();
        for id in &ids {
            let el = &self.elements[id];
            if !Station::is_station(el, &self.modes) {
                continue;
            }
            if el.id.kind == ElementKind::Relation && !el.tags.is("type", "multipolygon") {
                let rel_type = el.tags.get("type").cloned().unwrap_or_default();
                self.log.warn(
                    format!("A railway station cannot be a relation of type {}", rel_type),
                    Some(el),
                );
                continue;
            }

            let station = Station::new(el, &mut self.log)?;
            self.station_ids.insert(station.id);
            let hosting_rels = self
                .stop_area_rels
                .get(&station.id)
                .cloned()
                .unwrap_or_default();
            let mut stop_areas = Vec::new();
            if hosting_rels.is_empty() {
                stop_areas.push(StopArea::new(
                    &station,
                    None,
                    &self.elements,
                    &self.stop_area_rels,
                    &self.modes,
                    &mut self.log,
                ));
            } else {
                for rel_id in hosting_rels {
                    stop_areas.push(StopArea::new(
                        &station,
                        Some(&self.elements[&rel_id]),
                        &self.elements,
                        &self.stop_area_rels,
                        &self.modes,
                        &mut self.log,
                    ));
                }
            }

            for stop_area in stop_areas {
                if !processed_stop_areas.insert(stop_area.id) {
                    continue;
                }
                for el_id in stop_area.get_elements() {
                    self.stations_by_element
                        .entry(el_id)
                        .or_default()
                        .push(stop_area.id);
                }
                // Check that stops and platforms belong to a single stop_area
                for sp in stop_area.stops.iter().chain(stop_area.platforms.iter()) {
                    if !self.stops_and_platforms.insert(*sp) {
                        self.log.notice(
                            format!(
                                "A stop or a platform {} belongs to multiple stop areas, might \
                                 be correct",
                                sp
                            ),
                            None,
                        );
                    }
                }
                self.stop_areas.insert(stop_area.id, stop_area);
            }
            self.stations.insert(station.id, station);
        }

        // Routes; stop_area_groups are collected along the way
        let mut stop_area_groups: Vec<ElementId> = Vec::new();
        for id in &ids {
            let el = &self.elements[id];
            if el.id.kind == ElementKind::Relation
                && el.tags.is("public_transport", "stop_area_group")
            {
                stop_area_groups.push(*id);
            }

            if !Route::is_route(el, &self.modes) {
                continue;
            }
            if el.tags.is_any("access", vec!["no", "private"]) {
                continue;
            }
            let master_id = self.masters.get(id).copied();
            let master_el = master_id.map(|m| &self.elements[&m]);
            if !self.networks.is_empty() {
                let network_ok = el
                    .network()
                    .map(|n| self.networks.contains(n))
                    .unwrap_or(false);
                let master_network_ok = master_el
                    .and_then(|m| m.network())
                    .map(|n| self.networks.contains(n))
                    .unwrap_or(false);
                if !network_ok && !master_network_ok {
                    continue;
                }
            }

            let ctx = RouteContext {
                elements: &self.elements,
                stations: &self.stations,
                stop_areas: &self.stop_areas,
                stations_by_element: &self.stations_by_element,
                modes: &self.modes,
                recovery_data: self.recovery_data.as_ref(),
            };
            let route = Route::new(el, &ctx, master_el, &mut self.log)?;
            if route.stops.is_empty() {
                self.log.warn("Route has no stops", Some(el));
                continue;
            }
            if route.stops.len() == 1 {
                self.log.warn("Route has only one stop", Some(el));
                continue;
            }

            let key = master_id
                .map(|m| m.to_string())
                .unwrap_or_else(|| route.ref_.clone().unwrap_or_default());
            let route_master = self
                .routes
                .entry(key)
                .or_insert_with(|| RouteMaster::new(master_el));
            route_master.add(route, &self.elements, &mut self.log);
        }

        for group_id in stop_area_groups {
            self.make_transfer(group_id);
        }

        // Filter transfers, leaving only stop areas that belong to routes
        let own_stopareas: BTreeSet<ElementId> = self.stopareas().into_iter().collect();
        self.transfers = self
            .transfers
            .iter()
            .map(|transfer| transfer.intersection(&own_stopareas).copied().collect())
            .filter(|transfer: &BTreeSet<ElementId>| transfer.len() > 1)
            .collect();

        Ok(())
    }

    fn make_transfer(&mut self, group_id: ElementId) {
        let members: Vec<osm_reader::Member> = self.elements[&group_id].members().to_vec();
        let mut transfer: BTreeSet<ElementId> = BTreeSet::new();
        for m in &members {
            let k = m.element_id();
            let el = match self.elements.get(&k) {
                Some(el) => el,
                // A stop_area_group member may validly be outside the city
                // while the group strides the bbox boundary
                None => continue,
            };
            if el.tags.is_empty() {
                let group_el = &self.elements[&group_id];
                self.log.warn(
                    format!("An untagged object {} in a stop_area_group", k),
                    Some(group_el),
                );
                continue;
            }
            if k.kind != ElementKind::Relation
                || !el.tags.is("type", "public_transport")
                || !el.tags.is("public_transport", "stop_area")
            {
                continue;
            }
            if let Some(sa_ids) = self.stations_by_element.get(&k) {
                let stoparea_id = sa_ids[0];
                transfer.insert(stoparea_id);
            }
        }
        for stoparea_id in &transfer {
            let stoparea = self.stop_areas.get_mut(stoparea_id).unwrap();
            if stoparea.transfer.is_some() {
                // TODO: properly process stop areas in multiple interchanges,
                // like Châtelet / Les Halles in Paris
                self.log.warn(
                    format!("Stop area {} belongs to multiple interchanges", stoparea_id),
                    None,
                );
            }
            stoparea.transfer = Some(group_id);
        }
        if transfer.len() > 1 {
            self.transfers.push(transfer);
        }
    }

    /// Unique stop areas participating in any route, in route order.
    pub fn stopareas(&self) -> Vec<ElementId> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for route_master in self.routes.values() {
            for sa in route_master.stopareas() {
                if seen.insert(sa) {
                    result.push(sa);
                }
            }
        }
        result
    }

    fn count_unused_entrances(&mut self) {
        let mut stop_area_members: BTreeSet<ElementId> = BTreeSet::new();
        for el in self.elements.values() {
            if el.id.kind == ElementKind::Relation
                && el.tags.is("public_transport", "stop_area")
                && !el.members().is_empty()
            {
                stop_area_members.extend(el.members().iter().map(|m| m.element_id()));
            }
        }
        let mut unused: BTreeSet<ElementId> = BTreeSet::new();
        let mut not_in_sa: BTreeSet<ElementId> = BTreeSet::new();
        for el in self.elements.values() {
            if el.id.kind == ElementKind::Node && el.tags.is("railway", "subway_entrance") {
                let i = el.id;
                if self.stations_by_element.contains_key(&i) {
                    self.used_entrances.insert(i);
                }
                if !stop_area_members.contains(&i) {
                    not_in_sa.insert(i);
                    if !self.stations_by_element.contains_key(&i) {
                        unused.insert(i);
                    }
                }
            }
        }
        self.unused_entrances = unused.len();
        self.entrances_not_in_stop_areas = not_in_sa.len();
        if !unused.is_empty() {
            self.log.notice(
                format!(
                    "{} subway entrances are not connected to a station: {}",
                    unused.len(),
                    format_elid_list(&unused)
                ),
                None,
            );
        }
        if !not_in_sa.is_empty() {
            self.log.notice(
                format!(
                    "{} subway entrances are not in stop_area relations: {}",
                    not_in_sa.len(),
                    format_elid_list(&not_in_sa)
                ),
                None,
            );
        }
    }

    fn validate_lines(&mut self) {
        self.found_light_lines = self
            .routes
            .values()
            .filter(|x| x.mode.as_deref() != Some("subway"))
            .count();
        self.found_lines = self.routes.len() - self.found_light_lines;
        if self.found_lines as i64 != self.num_lines {
            self.log.error(
                format!(
                    "Found {} subway lines, expected {}",
                    self.found_lines, self.num_lines
                ),
                None,
            );
        }
        if self.found_light_lines as i64 != self.num_light_lines {
            self.log.error(
                format!(
                    "Found {} light rail lines, expected {}",
                    self.found_light_lines, self.num_light_lines
                ),
                None,
            );
        }
    }

    fn validate_overground_lines(&mut self) {
        self.found_tram_lines = self
            .routes
            .values()
            .filter(|x| x.mode.as_deref() == Some("tram"))
            .count();
        self.found_bus_lines = self
            .routes
            .values()
            .filter(|x| x.mode.as_deref() == Some("bus"))
            .count();
        self.found_trolleybus_lines = self
            .routes
            .values()
            .filter(|x| x.mode.as_deref() == Some("trolleybus"))
            .count();
        self.found_other_lines = self
            .routes
            .values()
            .filter(|x| {
                !matches!(
                    x.mode.as_deref(),
                    Some("bus") | Some("trolleybus") | Some("tram")
                )
            })
            .count();
        if self.found_tram_lines as i64 != self.num_tram_lines {
            let msg = format!(
                "Found {} tram lines, expected {}",
                self.found_tram_lines, self.num_tram_lines
            );
            if self.found_tram_lines == 0 {
                self.log.error(msg, None);
            } else {
                self.log.notice(msg, None);
            }
        }
    }

    /// Runs the per-city checks and finalizes the found counts. After this,
    /// `is_good` decides whether the city makes it into the outputs.
    pub fn validate(&mut self) {
        let mut networks: BTreeMap<String, usize> = BTreeMap::new();
        self.found_stations = 0;
        let mut unused_stations: BTreeSet<ElementId> = self.station_ids.clone();

        let keys: Vec<String> = self.routes.keys().cloned().collect();
        for key in &keys {
            let rmaster = &self.routes[key];
            *networks
                .entry(
                    rmaster
                        .network
                        .clone()
                        .unwrap_or_else(|| "None".to_string()),
                )
                .or_default() += 1;
            if !self.overground {
                rmaster.check_return_routes(
                    &self.stop_areas,
                    &self.stations,
                    &self.elements,
                    &mut self.log,
                );
            }
            let mut route_stations: BTreeSet<ElementId> = BTreeSet::new();
            for sa_id in rmaster.stopareas() {
                let sa = &self.stop_areas[&sa_id];
                route_stations.insert(sa.transfer.unwrap_or(sa.id));
                unused_stations.remove(&sa.station_id);
            }
            self.found_stations += route_stations.len();
        }
        if !unused_stations.is_empty() {
            self.log.notice(
                format!(
                    "{} unused stations: {}",
                    unused_stations.len(),
                    format_elid_list(&unused_stations)
                ),
                None,
            );
        }
        self.count_unused_entrances();
        self.found_interchanges = self.transfers.len();

        if self.overground {
            self.validate_overground_lines();
        } else {
            self.validate_lines();

            if self.found_stations as i64 != self.num_stations {
                let msg = format!(
                    "Found {} stations in routes, expected {}",
                    self.found_stations, self.num_stations
                );
                let mismatch = (self.num_stations - self.found_stations as i64) as f64
                    / self.num_stations as f64;
                if self.num_stations > 0 && !(0.0..=ALLOWED_STATIONS_MISMATCH).contains(&mismatch)
                {
                    self.log.error(msg, None);
                } else {
                    self.log.warn(msg, None);
                }
            }

            if self.found_interchanges as i64 != self.num_interchanges {
                let msg = format!(
                    "Found {} interchanges, expected {}",
                    self.found_interchanges, self.num_interchanges
                );
                let mismatch = (self.num_interchanges - self.found_interchanges as i64) as f64
                    / self.num_interchanges as f64;
                if self.num_interchanges != 0 && mismatch > ALLOWED_TRANSFERS_MISMATCH {
                    self.log.error(msg, None);
                } else {
                    self.log.warn(msg, None);
                }
            }
        }

        self.found_networks = networks.len();
        if networks.len() > 1.max(self.networks.len()) {
            let joined = networks
                .iter()
                .map(|(k, v)| format!("{} ({})", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            self.log
                .notice(format!("More than one network: {}", joined), None);
        }

        self.validate_called = true;
    }

    pub fn is_good(&self) -> bool {
        self.validate_called && !self.log.has_errors()
    }

    pub fn calculate_distances(&mut self) {
        for route_master in self.routes.values_mut() {
            for route in &mut route_master.routes {
                route.calculate_distances();
            }
        }
    }

    pub fn get_validation_result(&self) -> ValidationResult {
        let overground = self.overground;
        ValidationResult {
            name: self.name.clone(),
            country: self.country.clone(),
            continent: self.continent.clone(),
            stations_found: self.found_stations,
            transfers_found: self.found_interchanges,
            unused_entrances: self.unused_entrances,
            networks: self.found_networks,
            stations_expected: if overground { 0 } else { self.num_stations },
            transfers_expected: if overground { 0 } else { self.num_interchanges },
            subwayl_expected: (!overground).then(|| self.num_lines),
            lightrl_expected: (!overground).then(|| self.num_light_lines),
            subwayl_found: (!overground).then(|| self.found_lines),
            lightrl_found: (!overground).then(|| self.found_light_lines),
            traml_expected: overground.then(|| self.num_tram_lines),
            trolleybusl_expected: overground.then(|| self.num_trolleybus_lines),
            busl_expected: overground.then(|| self.num_bus_lines),
            otherl_expected: overground.then(|| self.num_other_lines),
            traml_found: overground.then(|| self.found_tram_lines),
            trolleybusl_found: overground.then(|| self.found_trolleybus_lines),
            busl_found: overground.then(|| self.found_bus_lines),
            otherl_found: overground.then(|| self.found_other_lines),
            warnings: self.log.warnings(),
            errors: self.log.errors(),
            notices: self.log.notices(),
        }
    }
}
