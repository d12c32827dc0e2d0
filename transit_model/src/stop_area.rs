use std::collections::{BTreeMap, BTreeSet};

use geom::LonLat;
use osm_reader::{Element, ElementId, ElementKind};

use crate::colours::normalize_colour;
use crate::station::Station;
use crate::validation::ValidationLog;
use crate::RAILWAY_TYPES;

/// When a station has no stop_area relation, entrances this close to it are
/// attached anyway. In meters.
pub const MAX_DISTANCE_TO_ENTRANCES: f64 = 300.0;

const ENTRANCE_TYPES: [&str; 2] = ["subway_entrance", "train_station_entrance"];

/// A logical station: one physical station grouped with its stop positions,
/// platforms and entrances, either via a `public_transport=stop_area`
/// relation or by proximity for a naked station.
#[derive(Clone, Debug)]
pub struct StopArea {
    /// The stop_area relation id, or the station element id for a naked
    /// station.
    pub id: ElementId,
    pub station_id: ElementId,
    pub name: String,
    pub int_name: Option<String>,
    pub colour: Option<String>,
    pub modes: BTreeSet<String>,
    pub stops: BTreeSet<ElementId>,
    pub platforms: BTreeSet<ElementId>,
    /// Entrances for entering the platform.
    pub entrances: BTreeSet<ElementId>,
    /// Entrances for leaving the platform.
    pub exits: BTreeSet<ElementId>,
    /// Centers of every member element, for output builders.
    pub centers: BTreeMap<ElementId, LonLat>,
    pub center: LonLat,
    /// The enclosing stop_area_group relation, if any.
    pub transfer: Option<ElementId>,
}

impl StopArea {
    pub fn is_stop(el: &Element) -> bool {
        el.tags.is("railway", "stop") || el.tags.is("public_transport", "stop_position")
    }

    pub fn is_platform(el: &Element) -> bool {
        el.tags.is_any("railway", vec!["platform", "platform_edge"])
            || el.tags.is("public_transport", "platform")
    }

    pub fn is_track(el: &Element) -> bool {
        el.id.kind == ElementKind::Way && el.tags.is_any("railway", RAILWAY_TYPES.to_vec())
    }

    pub fn new<'a>(
        station: &Station,
        stop_area_rel: Option<&'a Element>,
        elements: &'a BTreeMap<ElementId, Element>,
        stop_area_rels: &BTreeMap<ElementId, Vec<ElementId>>,
        modes: &BTreeSet<String>,
        log: &mut ValidationLog,
    ) -> StopArea {
        let mut sa = StopArea {
            id: stop_area_rel.map(|el| el.id).unwrap_or(station.id),
            station_id: station.id,
            name: station.name.clone(),
            int_name: station.int_name.clone(),
            colour: station.colour.clone(),
            modes: station.modes.clone(),
            stops: BTreeSet::new(),
            platforms: BTreeSet::new(),
            entrances: BTreeSet::new(),
            exits: BTreeSet::new(),
            centers: BTreeMap::new(),
            center: station.center,
            transfer: None,
        };

        if let Some(rel) = stop_area_rel {
            if let Some(name) = rel.tags.get("name") {
                sa.name = name.clone();
            }
            if let Some(int_name) = rel.tags.get("int_name").or_else(|| rel.tags.get("name:en")) {
                sa.int_name = Some(int_name.clone());
            }
            if let Some(value) = rel.tags.get("colour") {
                match normalize_colour(value) {
                    Ok(c) => sa.colour = Some(c),
                    Err(err) => log.warn(err.to_string(), Some(rel)),
                }
            }
            sa.process_members(station, rel, elements, modes, log);
        } else {
            sa.add_nearby_entrances(station, elements, stop_area_rels, log);
        }

        if !sa.exits.is_empty() && sa.entrances.is_empty() {
            log.warn(
                "Only exits for a station, no entrances",
                Some(stop_area_rel.unwrap_or_else(|| &elements[&station.id])),
            );
        }
        if !sa.entrances.is_empty() && sa.exits.is_empty() {
            log.warn(
                "No exits for a station",
                Some(stop_area_rel.unwrap_or_else(|| &elements[&station.id])),
            );
        }

        for el_id in sa.get_elements() {
            if let Some(center) = elements.get(&el_id).and_then(|el| el.center()) {
                sa.centers.insert(el_id, center);
            }
        }

        // The center cannot rely on the station node, since many stop areas
        // can share one. Average the stop positions and platforms instead.
        let pts: Vec<LonLat> = sa
            .stops
            .iter()
            .chain(sa.platforms.iter())
            .filter_map(|id| sa.centers.get(id).copied())
            .collect();
        if !pts.is_empty() {
            sa.center = LonLat::center(&pts);
        }
        sa
    }

    fn process_members(
        &mut self,
        station: &Station,
        rel: &Element,
        elements: &BTreeMap<ElementId, Element>,
        modes: &BTreeSet<String>,
        log: &mut ValidationLog,
    ) {
        let mut tracks_detected = false;
        for m in rel.members() {
            let k = m.element_id();
            let m_el = match elements.get(&k) {
                Some(el) if !el.tags.is_empty() => el,
                _ => continue,
            };
            if Station::is_station(m_el, modes) {
                if k != station.id {
                    log.error("Stop area has multiple stations", Some(rel));
                }
            } else if StopArea::is_stop(m_el) {
                self.stops.insert(k);
            } else if StopArea::is_platform(m_el) {
                self.platforms.insert(k);
            } else if let Some(entrance_type) =
                m_el.tags.get("railway").filter(|v| ENTRANCE_TYPES.contains(&v.as_str()))
            {
                if k.kind != ElementKind::Node {
                    log.warn(format!("{} is not a node", entrance_type), Some(m_el));
                }
                if !m_el.tags.is("entrance", "exit") && m.role != "exit_only" {
                    self.entrances.insert(k);
                }
                if !m_el.tags.is("entrance", "entrance") && m.role != "entry_only" {
                    self.exits.insert(k);
                }
            } else if StopArea::is_track(m_el) {
                tracks_detected = true;
            }
        }
        if tracks_detected {
            log.warn("Tracks in a stop_area relation", Some(rel));
        }
    }

    fn add_nearby_entrances(
        &mut self,
        station: &Station,
        elements: &BTreeMap<ElementId, Element>,
        stop_area_rels: &BTreeMap<ElementId, Vec<ElementId>>,
        log: &mut ValidationLog,
    ) {
        for el in elements.values() {
            let entrance_type = match el
                .tags
                .get("railway")
                .filter(|v| ENTRANCE_TYPES.contains(&v.as_str()))
            {
                Some(t) => t,
                None => continue,
            };
            // This entrance belongs to some stop_area
            if stop_area_rels.contains_key(&el.id) {
                continue;
            }
            let center = match el.center() {
                Some(c) => c,
                None => continue,
            };
            if station.center.gps_dist_meters(center) <= MAX_DISTANCE_TO_ENTRANCES {
                if el.id.kind != ElementKind::Node {
                    log.warn(format!("{} is not a node", entrance_type), Some(el));
                }
                let etag = el.tags.get("entrance").map(|s| s.as_str());
                if etag != Some("exit") {
                    self.entrances.insert(el.id);
                }
                if etag != Some("entrance") {
                    self.exits.insert(el.id);
                }
            }
        }
    }

    /// All element ids this stop area spans.
    pub fn get_elements(&self) -> BTreeSet<ElementId> {
        let mut result = BTreeSet::new();
        result.insert(self.id);
        result.insert(self.station_id);
        result.extend(&self.entrances);
        result.extend(&self.exits);
        result.extend(&self.stops);
        result.extend(&self.platforms);
        result
    }
}
