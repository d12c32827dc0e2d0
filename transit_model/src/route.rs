use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

use geom::{
    angle_between, distance_on_line, find_segment, project_on_line, LonLat,
    MAX_DISTANCE_STOP_TO_LINE,
};
use osm_reader::{Element, ElementId, ElementKind};

use crate::colours::normalize_colour;
use crate::recovery::CityRecoveryData;
use crate::route_stop::{ActualRole, RouteStop};
use crate::station::Station;
use crate::stop_area::StopArea;
use crate::validation::ValidationLog;
use crate::{CriticalValidationError, CONSTRUCTION_KEYS, DISPLACEMENT_TOLERANCE};

const ALLOWED_ANGLE_BETWEEN_STOPS: i32 = 45; // in degrees
const DISALLOWED_ANGLE_BETWEEN_STOPS: i32 = 20; // in degrees

/// Everything a route needs to see of its city during construction. All
/// borrows are read-only; messages go to the separate log.
pub struct RouteContext<'a> {
    pub elements: &'a BTreeMap<ElementId, Element>,
    pub stations: &'a BTreeMap<ElementId, Station>,
    pub stop_areas: &'a BTreeMap<ElementId, StopArea>,
    pub stations_by_element: &'a BTreeMap<ElementId, Vec<ElementId>>,
    pub modes: &'a BTreeSet<String>,
    pub recovery_data: Option<&'a CityRecoveryData>,
}

/// Very simplified parsing of an OSM opening_hours tag: the first
/// `HH:MM-HH:MM` substring, which covers the most probable service interval
/// for most weekdays, or the literal `24/7`.
pub fn parse_time_range(opening_hours: &str) -> Option<((u32, u32), (u32, u32))> {
    if opening_hours == "24/7" {
        return Some(((0, 0), (24, 0)));
    }
    let bytes = opening_hours.as_bytes();
    for window in 0..bytes.len().saturating_sub(10) {
        let w = &bytes[window..window + 11];
        if w[2] == b':' && w[5] == b'-' && w[8] == b':' && w.iter().enumerate().all(|(i, b)| {
            matches!(i, 2 | 5 | 8) || b.is_ascii_digit()
        }) {
            let num =
                |i: usize| -> u32 { (w[i] - b'0') as u32 * 10 + (w[i + 1] - b'0') as u32 };
            let (h1, m1, h2, m2) = (num(0), num(3), num(6), num(9));
            if m1 > 59 || m2 > 59 {
                return None;
            }
            return Some(((h1, m1), (h2, m2)));
        }
    }
    None
}

/// Converts an OSM `interval`/`headway`/`duration` value to seconds. The
/// accepted formats are HH:MM:SS, HH:MM, MM and M; zero and negative
/// intervals are rejected.
pub fn osm_interval_to_seconds(value: &str) -> Option<u32> {
    let parts: Vec<&str> = value.split(':').collect();
    let (hours, minutes, seconds): (i64, i64, i64) = match parts.len() {
        1 => (0, parts[0].parse().ok()?, 0),
        2 => (parts[0].parse().ok()?, parts[1].parse().ok()?, 0),
        3 => (
            parts[0].parse().ok()?,
            parts[1].parse().ok()?,
            parts[2].parse().ok()?,
        ),
        _ => return None,
    };
    if hours < 0 || minutes < 0 || seconds < 0 {
        return None;
    }
    if parts.len() > 1 && (seconds >= 60 || minutes >= 60) {
        return None;
    }
    let interval = seconds + 60 * minutes + 3600 * hours;
    if interval == 0 {
        return None;
    }
    u32::try_from(interval).ok()
}

/// Extracts a time interval from tags for any of `keys`, also accepting
/// prefixed variants like `interval:peak` when the base key is absent.
fn get_interval_in_seconds_from_tags(el: Option<&Element>, keys: &[&str]) -> Option<u32> {
    let el = el?;
    let mut value = None;
    for key in keys {
        if let Some(v) = el.tags.get(key) {
            value = Some(v);
            break;
        }
    }
    if value.is_none() {
        'outer: for key in keys {
            for (tag_name, v) in el.tags.iter() {
                if tag_name.starts_with(&format!("{}:", key)) {
                    value = Some(v);
                    break 'outer;
                }
            }
        }
    }
    osm_interval_to_seconds(value?)
}

pub(crate) fn get_route_interval(el: Option<&Element>) -> Option<u32> {
    get_interval_in_seconds_from_tags(el, &["interval", "headway"])
}

pub(crate) fn get_route_duration(el: Option<&Element>) -> Option<u32> {
    get_interval_in_seconds_from_tags(el, &["duration"])
}

/// Data about stops lying on the longest contiguous track stretch, produced
/// by the projection pass.
struct ProjectedStopData {
    stop_index: usize,
    coords: Option<LonLat>,
    positions_on_rails: Vec<f64>,
}

struct ProjectedStopsData {
    first_stop_on_rails_index: usize,
    last_stop_on_rails_index: usize,
    stops_on_longest_line: Vec<ProjectedStopData>,
}

/// One directional variant of a line.
#[derive(Clone, Debug)]
pub struct Route {
    pub id: ElementId,
    pub ref_: Option<String>,
    pub name: Option<String>,
    pub mode: String,
    pub colour: Option<String>,
    pub infill: Option<String>,
    pub network: Option<String>,
    pub interval: Option<u32>,
    pub duration: Option<u32>,
    pub start_time: Option<(u32, u32)>,
    pub end_time: Option<(u32, u32)>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub is_circular: bool,
    pub stops: Vec<RouteStop>,
    /// The longest contiguous stretch of rails, as coordinates. Can be
    /// empty.
    pub tracks: Vec<LonLat>,
    /// Index of the first stop located on or near the tracks.
    pub first_stop_on_rails_index: usize,
    /// Index of the last stop located on or near the tracks.
    pub last_stop_on_rails_index: usize,
}

impl Route {
    pub fn is_route(el: &Element, modes: &BTreeSet<String>) -> bool {
        if el.id.kind != ElementKind::Relation || !el.tags.is("type", "route") {
            return false;
        }
        match el.tags.get("route") {
            Some(mode) if modes.contains(mode) => {}
            _ => return false,
        }
        for k in CONSTRUCTION_KEYS {
            if el.tags.contains_key(k) {
                return false;
            }
        }
        if !el.tags.contains_key("ref") && !el.tags.contains_key("name") {
            return false;
        }
        true
    }

    pub fn new(
        relation: &Element,
        ctx: &RouteContext,
        master: Option<&Element>,
        log: &mut ValidationLog,
    ) -> Result<Route> {
        let mut route = Route {
            id: relation.id,
            ref_: None,
            name: None,
            mode: String::new(),
            colour: None,
            infill: None,
            network: None,
            interval: None,
            duration: None,
            start_time: None,
            end_time: None,
            from: relation.tags.get("from").cloned(),
            to: relation.tags.get("to").cloned(),
            is_circular: false,
            stops: Vec::new(),
            tracks: Vec::new(),
            first_stop_on_rails_index: 0,
            last_stop_on_rails_index: 0,
        };
        route.process_tags(relation, master, log);
        let stop_position_elements = route.process_stop_members(relation, ctx, log)?;
        route.process_tracks(relation, ctx, stop_position_elements, log);
        Ok(route)
    }

    /// Unique stop areas of this route, in stop order.
    pub fn stopareas(&self) -> Vec<ElementId> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for stop in &self.stops {
            if seen.insert(stop.stoparea_id) {
                result.push(stop.stoparea_id);
            }
        }
        result
    }

    fn process_tags(&mut self, relation: &Element, master: Option<&Element>, log: &mut ValidationLog) {
        let tags = &relation.tags;
        let master_tag = |key: &str| master.and_then(|m| m.tags.get(key));

        if !tags.contains_key("ref") && master_tag("ref").is_none() {
            log.notice("Missing ref on a route", Some(relation));
        }
        self.ref_ = tags
            .get("ref")
            .or_else(|| master_tag("ref"))
            .or_else(|| tags.get("name"))
            .cloned();
        self.name = tags.get("name").cloned();
        self.mode = tags.get("route").cloned().unwrap_or_default();

        if !tags.contains_key("colour") && master_tag("colour").is_none() && self.mode != "tram" {
            log.notice("Missing colour on a route", Some(relation));
        }
        if let Some(value) = tags.get("colour").or_else(|| master_tag("colour")) {
            match normalize_colour(value) {
                Ok(c) => self.colour = Some(c),
                Err(err) => log.warn(err.to_string(), Some(relation)),
            }
        }
        if let Some(value) = tags
            .get("colour:infill")
            .or_else(|| master_tag("colour:infill"))
        {
            match normalize_colour(value) {
                Ok(c) => self.infill = Some(c),
                Err(err) => log.warn(err.to_string(), Some(relation)),
            }
        }
        self.network = relation.network().cloned();
        self.interval = get_route_interval(Some(relation)).or_else(|| get_route_interval(master));
        self.duration = get_route_duration(Some(relation)).or_else(|| get_route_duration(master));
        if let Some(opening_hours) = tags.get("opening_hours").or_else(|| master_tag("opening_hours"))
        {
            if let Some((start, end)) = parse_time_range(opening_hours) {
                self.start_time = Some(start);
                self.end_time = Some(end);
            }
        }

        if tags.is("public_transport:version", "1") {
            log.warn(
                "Public transport version is 1, which means the route is an unsorted pile of objects",
                Some(relation),
            );
        }
    }

    fn process_stop_members(
        &mut self,
        relation: &Element,
        ctx: &RouteContext,
        log: &mut ValidationLog,
    ) -> Result<Vec<ElementId>> {
        let mut added_stopareas: BTreeSet<ElementId> = BTreeSet::new();
        let mut seen_stops = false;
        let mut seen_platforms = false;
        let mut repeat_pos: Option<usize> = None;
        let mut stop_position_elements: Vec<ElementId> = Vec::new();

        for m in relation.members() {
            if m.role.contains("inactive") {
                continue;
            }
            let k = m.element_id();
            let mut handled = false;

            if let Some(sa_ids) = ctx.stations_by_element.get(&k) {
                let st_id = sa_ids[0];
                let st = &ctx.stop_areas[&st_id];
                if sa_ids.len() > 1 {
                    log.error(
                        format!(
                            "Ambiguous station {} in route. Please use stop_position or split \
                             interchange stations",
                            st.name
                        ),
                        Some(relation),
                    );
                }
                let el = &ctx.elements[&k];
                if let Some(actual_role) = RouteStop::get_actual_role(el, &m.role, ctx.modes) {
                    if !m.role.is_empty() && !m.role.contains(actual_role.as_str()) {
                        log.warn(
                            format!("Wrong role '{}' for {} {}", m.role, actual_role, k),
                            Some(relation),
                        );
                    }

                    let mut stop_idx: Option<usize> = None;
                    if repeat_pos.is_none() {
                        if self.stops.is_empty() || !added_stopareas.contains(&st_id) {
                            self.stops.push(RouteStop::new(st));
                            added_stopareas.insert(st_id);
                            stop_idx = Some(self.stops.len() - 1);
                        } else if self.stops.last().map(|s| s.stoparea_id) == Some(st_id) {
                            stop_idx = Some(self.stops.len() - 1);
                        } else {
                            // We've got a repeat
                            if (seen_stops && seen_platforms)
                                || (actual_role == ActualRole::Stop && !seen_platforms)
                                || (actual_role == ActualRole::Platform && !seen_stops)
                            {
                                // Circular route!
                                self.stops.push(RouteStop::new(st));
                                added_stopareas.insert(st_id);
                                stop_idx = Some(self.stops.len() - 1);
                            } else {
                                repeat_pos = Some(0);
                            }
                        }
                    }
                    if stop_idx.is_none() {
                        if let Some(pos) = repeat_pos {
                            if pos >= self.stops.len() {
                                continue;
                            }
                            // Check that the type matches
                            if (actual_role == ActualRole::Stop && seen_stops)
                                || (actual_role == ActualRole::Platform && seen_platforms)
                            {
                                log.error(
                                    format!(
                                        "Found an out-of-place {}: \"{}\" ({})",
                                        actual_role,
                                        el.tags.get("name").cloned().unwrap_or_default(),
                                        k
                                    ),
                                    Some(relation),
                                );
                                continue;
                            }
                            // Find the matching stop starting with repeat_pos
                            let mut pos = pos;
                            while pos < self.stops.len() && self.stops[pos].stoparea_id != st_id {
                                pos += 1;
                            }
                            repeat_pos = Some(pos);
                            if pos >= self.stops.len() {
                                log.error(
                                    format!("Incorrect order of {}s at {}", actual_role, k),
                                    Some(relation),
                                );
                                continue;
                            }
                            stop_idx = Some(pos);
                        }
                    }

                    if let Some(idx) = stop_idx {
                        self.stops[idx].add(m, relation, ctx.elements, ctx.modes, log);
                        if repeat_pos.is_none() {
                            seen_stops |=
                                self.stops[idx].seen_stop || self.stops[idx].seen_station;
                            seen_platforms |= self.stops[idx].seen_platform();
                        }
                        if StopArea::is_stop(el) {
                            stop_position_elements.push(el.id);
                        }
                        handled = true;
                    }
                }
            }
            if handled {
                continue;
            }

            let el = match ctx.elements.get(&k) {
                Some(el) => el,
                None => {
                    if m.role.contains("stop") || m.role.contains("platform") {
                        return Err(anyhow::Error::new(CriticalValidationError(format!(
                            "{} {} {} for route relation {} is not in the dataset",
                            m.role,
                            m.kind.name(),
                            m.id,
                            relation.id.id
                        ))));
                    }
                    continue;
                }
            };
            if el.tags.is_empty() {
                log.error(format!("Untagged object {} in a route", k), Some(relation));
                continue;
            }

            let mut is_under_construction = false;
            for ck in CONSTRUCTION_KEYS {
                if el.tags.contains_key(ck) {
                    log.warn(
                        format!(
                            "Under construction {} {} in route. Consider setting 'inactive' role \
                             or removing construction attributes",
                            if m.role.is_empty() { "feature" } else { m.role.as_str() },
                            k
                        ),
                        Some(relation),
                    );
                    is_under_construction = true;
                    break;
                }
            }
            if is_under_construction {
                continue;
            }

            if Station::is_station(el, ctx.modes) {
                // A station may be not included in this route due to a
                // previous 'stop area has multiple stations' error. No other
                // error message is needed.
            } else if el.tags.is_any("railway", vec!["station", "halt"]) {
                log.error(
                    format!("Missing station={} on a {}", self.mode, m.role),
                    Some(el),
                );
            } else if let Some(actual_role) = RouteStop::get_actual_role(el, &m.role, ctx.modes) {
                log.error(
                    format!(
                        "{} {} {} is not connected to a station in route",
                        actual_role,
                        m.kind.name(),
                        m.id
                    ),
                    Some(relation),
                );
            } else if !StopArea::is_track(el) {
                log.warn(
                    format!("Unknown member type for {} {} in route", m.kind.name(), m.id),
                    Some(relation),
                );
            }
        }
        Ok(stop_position_elements)
    }

    /// Builds the longest contiguous sequence of track nodes from the
    /// relation's railway members. Returns the node ids of that sequence and
    /// the set of all railway node ids.
    fn build_longest_line(
        &self,
        relation: &Element,
        ctx: &RouteContext,
        log: &mut ValidationLog,
    ) -> (Vec<ElementId>, BTreeSet<ElementId>) {
        let mut line_nodes: BTreeSet<ElementId> = BTreeSet::new();
        let mut last_track: Vec<ElementId> = Vec::new();
        let mut track: Vec<ElementId> = Vec::new();
        let mut warned_about_holes = false;
        let mut is_first = true;

        for m in relation.members() {
            let el = match ctx.elements.get(&m.element_id()) {
                Some(el) if StopArea::is_track(el) => el,
                _ => continue,
            };
            if el.nodes().len() < 2 {
                log.error("Cannot find nodes in a railway", Some(el));
                continue;
            }
            let mut nodes: Vec<ElementId> = el.nodes().iter().map(|n| ElementId::node(*n)).collect();
            if m.role == "backward" {
                nodes.reverse();
            }
            line_nodes.extend(nodes.iter().copied());
            if track.is_empty() {
                is_first = true;
                track.extend(nodes);
            } else {
                let new_segment = nodes;
                if new_segment[0] == *track.last().unwrap() {
                    track.extend(new_segment[1..].iter().copied());
                } else if *new_segment.last().unwrap() == *track.last().unwrap() {
                    track.extend(new_segment[..new_segment.len() - 1].iter().rev().copied());
                } else if is_first
                    && (track[0] == new_segment[0] || track[0] == *new_segment.last().unwrap())
                {
                    // We can reverse the track and try again
                    track.reverse();
                    if new_segment[0] == *track.last().unwrap() {
                        track.extend(new_segment[1..].iter().copied());
                    } else {
                        track.extend(new_segment[..new_segment.len() - 1].iter().rev().copied());
                    }
                } else {
                    // Store the track if it is long and clean it
                    if !warned_about_holes {
                        log.warn(
                            format!("Hole in route rails near node {}", track.last().unwrap()),
                            Some(relation),
                        );
                        warned_about_holes = true;
                    }
                    if track.len() > last_track.len() {
                        last_track = std::mem::take(&mut track);
                    } else {
                        track.clear();
                    }
                }
                is_first = false;
            }
        }
        if track.len() > last_track.len() {
            last_track = track;
        }
        // Remove duplicate points
        last_track.dedup();
        (last_track, line_nodes)
    }

    fn process_tracks(
        &mut self,
        relation: &Element,
        ctx: &RouteContext,
        stop_position_elements: Vec<ElementId>,
        log: &mut ValidationLog,
    ) {
        let (track_nodes, line_nodes) = self.build_longest_line(relation, ctx, log);

        for stop_id in &stop_position_elements {
            if !line_nodes.contains(stop_id) {
                let name = ctx.elements[stop_id]
                    .tags
                    .get("name")
                    .cloned()
                    .unwrap_or_default();
                log.warn(
                    format!("Stop position \"{}\" ({}) is not on tracks", name, stop_id),
                    Some(relation),
                );
            }
        }

        self.tracks = Vec::new();
        let mut missing_node = None;
        for n in &track_nodes {
            match ctx.elements.get(n).and_then(|el| el.center()) {
                Some(pt) => self.tracks.push(pt),
                None => {
                    missing_node = Some(*n);
                    break;
                }
            }
        }
        if let Some(n) = missing_node {
            // Usually extending the bbox for the city is needed
            self.tracks = Vec::new();
            log.warn(
                format!("The dataset is missing the railway tracks node {}", n),
                Some(relation),
            );
        }

        if self.stops.len() > 1 {
            self.is_circular =
                self.stops[0].stoparea_id == self.stops[self.stops.len() - 1].stoparea_id;
            if self.is_circular
                && !self.tracks.is_empty()
                && self.tracks[0] != self.tracks[self.tracks.len() - 1]
            {
                log.warn("Non-closed rail sequence in a circular route", Some(relation));
            }

            let mut projected = self.project_stops_on_line(relation, ctx, log);
            let (disorder_warnings, disorder_errors) =
                self.check_stops_order(relation, ctx, &mut projected, log);
            self.apply_projected_stops_data(&projected);

            if !disorder_warnings.is_empty() || !disorder_errors.is_empty() {
                let mut resort_success = false;
                if ctx.recovery_data.is_some() {
                    resort_success = self.try_resort_stops(ctx);
                    if resort_success {
                        for msg in &disorder_warnings {
                            log.notice(msg.clone(), Some(relation));
                        }
                        for msg in &disorder_errors {
                            log.warn(format!("Fixed with recovery data: {}", msg), Some(relation));
                        }
                    }
                }
                if !resort_success {
                    for msg in &disorder_warnings {
                        log.notice(msg.clone(), Some(relation));
                    }
                    for msg in &disorder_errors {
                        log.error(msg.clone(), Some(relation));
                    }
                }
            }
        }
    }

    fn stop_projections(&self) -> Vec<Option<geom::LineProjection>> {
        self.stops
            .iter()
            .map(|stop| project_on_line(stop.stop, &self.tracks))
            .collect()
    }

    fn project_stops_on_line(
        &mut self,
        relation: &Element,
        ctx: &RouteContext,
        log: &mut ValidationLog,
    ) -> ProjectedStopsData {
        let projected = self.stop_projections();
        let near_tracks = |i: usize| -> bool {
            projected[i]
                .as_ref()
                .map(|p| {
                    self.stops[i].stop.gps_dist_meters(p.projected_point)
                        <= MAX_DISTANCE_STOP_TO_LINE
                })
                .unwrap_or(false)
        };

        let mut first_index = 0;
        while first_index < self.stops.len() && !near_tracks(first_index) {
            first_index += 1;
        }
        let mut last_index = self.stops.len() - 1;
        while last_index > first_index && !near_tracks(last_index) {
            last_index -= 1;
        }

        let mut data = ProjectedStopsData {
            first_stop_on_rails_index: first_index,
            last_stop_on_rails_index: last_index,
            stops_on_longest_line: Vec::new(),
        };
        for (i, stop) in self.stops.iter().enumerate() {
            if i < first_index || i > last_index {
                continue;
            }
            let name = &ctx.stop_areas[&stop.stoparea_id].name;
            match &projected[i] {
                None => {
                    log.error(
                        format!("Stop \"{}\" {} is nowhere near the tracks", name, stop.stop),
                        Some(relation),
                    );
                }
                Some(projection) => {
                    let mut coords = None;
                    // We've got two separate stations with a good stretch of
                    // railway tracks between them. Put these on tracks.
                    let d = stop.stop.gps_dist_meters(projection.projected_point).round();
                    if d > MAX_DISTANCE_STOP_TO_LINE {
                        log.notice(
                            format!(
                                "Stop \"{}\" {} is {} meters from the tracks",
                                name, stop.stop, d
                            ),
                            Some(relation),
                        );
                    } else {
                        coords = Some(projection.projected_point);
                    }
                    data.stops_on_longest_line.push(ProjectedStopData {
                        stop_index: i,
                        coords,
                        positions_on_rails: projection.positions_on_line.clone(),
                    });
                }
            }
        }
        data
    }

    fn apply_projected_stops_data(&mut self, data: &ProjectedStopsData) {
        self.first_stop_on_rails_index = data.first_stop_on_rails_index;
        self.last_stop_on_rails_index = data.last_stop_on_rails_index;
        for stop_data in &data.stops_on_longest_line {
            let stop = &mut self.stops[stop_data.stop_index];
            stop.positions_on_rails = stop_data.positions_on_rails.clone();
            if let Some(coords) = stop_data.coords {
                stop.stop = coords;
            }
        }
    }

    fn check_stops_order_by_angle(&self, ctx: &RouteContext) -> (Vec<String>, Vec<String>) {
        let mut disorder_warnings = Vec::new();
        let mut disorder_errors = Vec::new();
        for i in 1..self.stops.len().saturating_sub(1) {
            let angle = angle_between(
                self.stops[i - 1].stop,
                self.stops[i].stop,
                self.stops[i + 1].stop,
            );
            if angle < ALLOWED_ANGLE_BETWEEN_STOPS {
                let msg = format!(
                    "Angle between stops around \"{}\" {} is too narrow, {} degrees",
                    ctx.stop_areas[&self.stops[i].stoparea_id].name, self.stops[i].stop, angle
                );
                if angle < DISALLOWED_ANGLE_BETWEEN_STOPS {
                    disorder_errors.push(msg);
                } else {
                    disorder_warnings.push(msg);
                }
            }
        }
        (disorder_warnings, disorder_errors)
    }

    /// Checks that stop positions progress monotonically along the tracks,
    /// following the given order. Returns an error message on the first
    /// violation. Circular routes get one wrap-around allowance.
    fn check_stops_order_on_tracks_direct<'a>(
        &self,
        stop_sequence: impl Iterator<Item = &'a ProjectedStopData>,
        ctx: &RouteContext,
    ) -> Option<String> {
        let mut allowed_order_violations = if self.is_circular { 1 } else { 0 };
        let mut max_position_on_rails = -1.0;
        for stop_data in stop_sequence {
            let positions = &stop_data.positions_on_rails;
            let mut suitable = 0;
            while suitable < positions.len() && positions[suitable] < max_position_on_rails {
                suitable += 1;
            }
            if suitable == positions.len() {
                if allowed_order_violations > 0 {
                    suitable -= 1;
                    allowed_order_violations -= 1;
                } else {
                    let stop = &self.stops[stop_data.stop_index];
                    return Some(format!(
                        "Stops on tracks are unordered near \"{}\" {}",
                        ctx.stop_areas[&stop.stoparea_id].name, stop.stop
                    ));
                }
            }
            max_position_on_rails = positions[suitable];
        }
        None
    }

    /// Tries the direct and the reversed stop order. If only the reversed
    /// order is consistent, the tracks themselves are backwards: reverse
    /// them and re-project.
    fn check_stops_order_on_tracks(
        &mut self,
        relation: &Element,
        ctx: &RouteContext,
        projected: &mut ProjectedStopsData,
        log: &mut ValidationLog,
    ) -> Option<String> {
        let error_message =
            self.check_stops_order_on_tracks_direct(projected.stops_on_longest_line.iter(), ctx);
        if error_message.is_some() {
            let reversed_message = self
                .check_stops_order_on_tracks_direct(projected.stops_on_longest_line.iter().rev(), ctx);
            if reversed_message.is_none() {
                log.warn(
                    "Tracks seem to go in the opposite direction to stops",
                    Some(relation),
                );
                self.tracks.reverse();
                *projected = self.project_stops_on_line(relation, ctx, log);
                return None;
            }
        }
        error_message
    }

    fn check_stops_order(
        &mut self,
        relation: &Element,
        ctx: &RouteContext,
        projected: &mut ProjectedStopsData,
        log: &mut ValidationLog,
    ) -> (Vec<String>, Vec<String>) {
        let (disorder_warnings, mut disorder_errors) = self.check_stops_order_by_angle(ctx);
        if let Some(msg) = self.check_stops_order_on_tracks(relation, ctx, projected, log) {
            disorder_errors.push(msg);
        }
        (disorder_warnings, disorder_errors)
    }

    /// Re-sorts stops according to an itinerary of a previous run. Requires
    /// the same station set with every station displaced less than the
    /// tolerance; ambiguity is resolved through the from/to tags. Returns
    /// whether the order was recovered.
    fn try_resort_stops(&mut self, ctx: &RouteContext) -> bool {
        let recovery = match ctx.recovery_data {
            Some(r) => r,
            None => return false,
        };
        // Stops of routes with repeating stations are not recovered
        // programmatically; such cases are rare and deserve manual review.
        let mut self_stops: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, stop) in self.stops.iter().enumerate() {
            let station = &ctx.stations[&ctx.stop_areas[&stop.stoparea_id].station_id];
            let mut stop_name = station.name.as_str();
            if stop_name == "?" {
                if let Some(int_name) = &station.int_name {
                    stop_name = int_name;
                }
            }
            if self_stops.insert(stop_name, i).is_some() {
                return false;
            }
        }

        let itineraries = match recovery.lookup(&self.colour, &self.ref_) {
            Some(itineraries) => itineraries,
            None => return false,
        };

        let mut suitable_itineraries = Vec::new();
        for itinerary in itineraries {
            let itinerary_stop_names: BTreeSet<&str> =
                itinerary.stations.iter().map(|s| s.name.as_str()).collect();
            if itinerary.stations.len() != self.stops.len()
                || itinerary_stop_names != self_stops.keys().copied().collect()
            {
                continue;
            }
            let big_station_displacement = itinerary.stations.iter().any(|it_stop| {
                let stop_index = self_stops[it_stop.name.as_str()];
                let station =
                    &ctx.stations[&ctx.stop_areas[&self.stops[stop_index].stoparea_id].station_id];
                it_stop.center.gps_dist_meters(station.center) > DISPLACEMENT_TOLERANCE
            });
            if !big_station_displacement {
                suitable_itineraries.push(itinerary);
            }
        }

        let matching_itinerary = match suitable_itineraries.len() {
            0 => return false,
            1 => suitable_itineraries[0],
            _ => {
                if self.from.is_none() && self.to.is_none() {
                    return false;
                }
                let matching: Vec<_> = suitable_itineraries
                    .iter()
                    .filter(|itin| {
                        (self.from.is_some() && itin.from == self.from)
                            || (self.to.is_some() && itin.to == self.to)
                    })
                    .collect();
                if matching.len() != 1 {
                    return false;
                }
                matching[0]
            }
        };
        let resorted: Vec<RouteStop> = matching_itinerary
            .stations
            .iter()
            .map(|s| self.stops[self_stops[s.name.as_str()]].clone())
            .collect();
        self.stops = resorted;
        true
    }

    pub fn calculate_distances(&mut self) {
        let mut dist: u64 = 0;
        let mut vertex = 0;
        for i in 0..self.stops.len() {
            if i > 0 {
                let direct = self.stops[i - 1].stop.gps_dist_meters(self.stops[i].stop);
                let mut d_line = None;
                if self.first_stop_on_rails_index <= i && i <= self.last_stop_on_rails_index {
                    d_line = distance_on_line(
                        self.stops[i - 1].stop,
                        self.stops[i].stop,
                        &self.tracks,
                        vertex,
                    );
                }
                match d_line {
                    Some((d, next_vertex)) if direct - 10.0 <= d && d <= direct * 2.0 => {
                        vertex = next_vertex;
                        dist += d.round() as u64;
                    }
                    _ => {
                        dist += direct.round() as u64;
                    }
                }
            }
            self.stops[i].distance = dist;
        }
    }

    pub fn are_tracks_complete(&self) -> bool {
        self.first_stop_on_rails_index == 0
            && self.last_stop_on_rails_index == self.stops.len() - 1
    }

    /// Amends the tracks with the coordinates of leading/trailing stops that
    /// were not projected onto the longest line. Returns a new array.
    pub fn get_extended_tracks(&self) -> Vec<LonLat> {
        if self.first_stop_on_rails_index >= self.stops.len() {
            return self.stops.iter().map(|s| s.stop).collect();
        }
        let mut tracks: Vec<LonLat> = self
            .stops
            .iter()
            .take(self.first_stop_on_rails_index)
            .map(|s| s.stop)
            .collect();
        tracks.extend(self.tracks.iter().copied());
        tracks.extend(
            self.stops
                .iter()
                .enumerate()
                .filter(|(i, _)| *i > self.last_stop_on_rails_index)
                .map(|(_, s)| s.stop),
        );
        tracks
    }

    /// Truncates leading/trailing segments that are beyond the first and
    /// last stop locations. Returns a new array.
    pub fn get_truncated_tracks(&self, tracks: &[LonLat]) -> Vec<LonLat> {
        if self.is_circular {
            return tracks.to_vec();
        }
        let mut tracks = tracks.to_vec();

        if let Some(last_stop) = self.stops.last() {
            if let Some((seg2, u2)) = find_segment(last_stop.stop, &tracks, 0) {
                let mut seg2 = seg2 as isize;
                if u2 == 0.0 {
                    // Make it the segment the stop is at the middle or end of
                    seg2 -= 1;
                }
                if seg2 + 2 < tracks.len() as isize {
                    tracks.truncate((seg2 + 2) as usize);
                }
                let last = tracks.len() - 1;
                tracks[last] = last_stop.stop;
            }
        }
        if let Some(first_stop) = self.stops.first() {
            if let Some((seg1, u1)) = find_segment(first_stop.stop, &tracks, 0) {
                let mut seg1 = seg1;
                if u1 == 1.0 {
                    // Make it the segment the stop is at the beginning or
                    // middle of
                    seg1 += 1;
                }
                if seg1 > 0 {
                    tracks.drain(..seg1);
                }
                tracks[0] = first_stop.stop;
            }
        }
        tracks
    }

    pub fn get_tracks_geometry(&self) -> Vec<LonLat> {
        let tracks = self.get_extended_tracks();
        self.get_truncated_tracks(&tracks)
    }

    /// End stops as transfer ids when possible, so that a train arriving at
    /// different stations of one interchange still counts. But disregard a
    /// transfer spanning both ends, which would fake a circular route.
    pub fn get_end_transfers(
        &self,
        stop_areas: &BTreeMap<ElementId, StopArea>,
    ) -> (ElementId, ElementId) {
        let first = &stop_areas[&self.stops[0].stoparea_id];
        let last = &stop_areas[&self.stops[self.stops.len() - 1].stoparea_id];
        if first.transfer.is_some() && first.transfer == last.transfer {
            (first.id, last.id)
        } else {
            (
                first.transfer.unwrap_or(first.id),
                last.transfer.unwrap_or(last.id),
            )
        }
    }

    /// The stop sequence as transfer ids where available.
    pub fn get_transfers_sequence(
        &self,
        stop_areas: &BTreeMap<ElementId, StopArea>,
    ) -> Vec<ElementId> {
        let mut seq: Vec<ElementId> = self
            .stops
            .iter()
            .map(|stop| {
                let sa = &stop_areas[&stop.stoparea_id];
                sa.transfer.unwrap_or(sa.id)
            })
            .collect();
        let first = &stop_areas[&self.stops[0].stoparea_id];
        let last = &stop_areas[&self.stops[self.stops.len() - 1].stoparea_id];
        if first.transfer.is_some() && first.transfer == last.transfer {
            let (a, b) = self.get_end_transfers(stop_areas);
            seq[0] = a;
            let n = seq.len() - 1;
            seq[n] = b;
        }
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_range() {
        assert_eq!(parse_time_range("24/7"), Some(((0, 0), (24, 0))));
        assert_eq!(
            parse_time_range("05:30-00:30"),
            Some(((5, 30), (0, 30)))
        );
        assert_eq!(
            parse_time_range("Mo-Fr 06:00-23:00; Sa 07:00-22:00"),
            Some(((6, 0), (23, 0)))
        );
        assert_eq!(parse_time_range("06:00-23:70"), None);
        assert_eq!(parse_time_range("sunrise-sunset"), None);
        assert_eq!(parse_time_range(""), None);
    }

    #[test]
    fn test_osm_interval_to_seconds() {
        assert_eq!(osm_interval_to_seconds("5"), Some(300));
        assert_eq!(osm_interval_to_seconds("90"), Some(5400));
        assert_eq!(osm_interval_to_seconds("1:15"), Some(4500));
        assert_eq!(osm_interval_to_seconds("00:01:30"), Some(90));
        assert_eq!(osm_interval_to_seconds("00:00:10"), Some(10));
        assert_eq!(osm_interval_to_seconds("0"), None);
        assert_eq!(osm_interval_to_seconds("00:00"), None);
        assert_eq!(osm_interval_to_seconds("-5"), None);
        assert_eq!(osm_interval_to_seconds("1:70"), None);
        assert_eq!(osm_interval_to_seconds("00:01:70"), None);
        assert_eq!(osm_interval_to_seconds("1:2:3:4"), None);
        assert_eq!(osm_interval_to_seconds("every 5 minutes"), None);
    }
}
