use std::collections::{BTreeMap, BTreeSet};

use geom::{project_on_line, MAX_DISTANCE_STOP_TO_LINE};
use osm_reader::{Element, ElementId};

use crate::colours::normalize_colour;
use crate::route::Route;
use crate::route_stop::RouteStop;
use crate::stop_area::StopArea;
use crate::validation::ValidationLog;

/// If stops of twin routes misalign but their stations are closer than
/// this, suggest merging them into one stop area. In meters.
const SUGGEST_TRANSFER_MIN_DISTANCE: f64 = 100.0;

/// All variants of one line, aggregated either under a `route_master`
/// relation or under a shared ref.
#[derive(Clone, Debug)]
pub struct RouteMaster {
    /// The master relation id, or the smallest variant id when there is no
    /// master relation.
    pub id: Option<ElementId>,
    pub has_master: bool,
    pub ref_: Option<String>,
    pub name: Option<String>,
    pub colour: Option<String>,
    pub infill: Option<String>,
    pub network: Option<String>,
    pub mode: Option<String>,
    pub interval: Option<u32>,
    pub duration: Option<u32>,
    interval_from_master: bool,
    pub routes: Vec<Route>,
    /// Index of the longest variant, ties broken by the smallest id.
    pub best: Option<usize>,
}

impl RouteMaster {
    pub fn new(master: Option<&Element>) -> RouteMaster {
        let mut rm = RouteMaster {
            id: master.map(|el| el.id),
            has_master: master.is_some(),
            ref_: None,
            name: None,
            colour: None,
            infill: None,
            network: None,
            mode: None,
            interval: None,
            duration: None,
            interval_from_master: false,
            routes: Vec::new(),
            best: None,
        };
        if let Some(master) = master {
            rm.ref_ = master
                .tags
                .get("ref")
                .or_else(|| master.tags.get("name"))
                .cloned();
            rm.colour = master
                .tags
                .get("colour")
                .and_then(|c| normalize_colour(c).ok());
            rm.infill = master
                .tags
                .get("colour:infill")
                .and_then(|c| normalize_colour(c).ok());
            rm.network = master.network().cloned();
            // The route_master tag is required, but okay
            rm.mode = master.tags.get("route_master").cloned();
            rm.name = master.tags.get("name").cloned();
            rm.interval = crate::route::get_route_interval(Some(master));
            rm.interval_from_master = rm.interval.is_some();
            rm.duration = crate::route::get_route_duration(Some(master));
        }
        rm
    }

    fn id_str(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_default()
    }

    /// Unique stop areas across all variants, in route order.
    pub fn stopareas(&self) -> Vec<ElementId> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for route in &self.routes {
            for sa in route.stopareas() {
                if seen.insert(sa) {
                    result.push(sa);
                }
            }
        }
        result
    }

    /// Enrolls a route variant, reconciling its line identity with the
    /// master's. A mode mismatch rejects the route.
    pub fn add(&mut self, route: Route, elements: &BTreeMap<ElementId, Element>, log: &mut ValidationLog) {
        let route_el = elements.get(&route.id);

        if self.network.is_none() {
            self.network = route.network.clone();
        } else if route.network.is_some() && route.network != self.network {
            log.error(
                format!(
                    "Route has different network (\"{}\") from master \"{}\"",
                    route.network.as_deref().unwrap_or_default(),
                    self.network.as_deref().unwrap_or_default()
                ),
                route_el,
            );
        }

        if self.colour.is_none() {
            self.colour = route.colour.clone();
        } else if route.colour.is_some() && route.colour != self.colour {
            log.notice(
                format!(
                    "Route \"{}\" has different colour from master \"{}\"",
                    route.colour.as_deref().unwrap_or_default(),
                    self.colour.as_deref().unwrap_or_default()
                ),
                route_el,
            );
        }

        if self.infill.is_none() {
            self.infill = route.infill.clone();
        } else if route.infill.is_some() && route.infill != self.infill {
            log.notice(
                format!(
                    "Route \"{}\" has different infill colour from master \"{}\"",
                    route.infill.as_deref().unwrap_or_default(),
                    self.infill.as_deref().unwrap_or_default()
                ),
                route_el,
            );
        }

        if self.ref_.is_none() {
            self.ref_ = route.ref_.clone();
        } else if route.ref_ != self.ref_ {
            log.notice(
                format!(
                    "Route \"{}\" has different ref from master \"{}\"",
                    route.ref_.as_deref().unwrap_or_default(),
                    self.ref_.as_deref().unwrap_or_default()
                ),
                route_el,
            );
        }

        if self.name.is_none() {
            self.name = route.name.clone();
        }

        if self.mode.is_none() {
            self.mode = Some(route.mode.clone());
        } else if self.mode.as_deref() != Some(route.mode.as_str()) {
            log.error(
                format!(
                    "Incompatible PT mode: master has {} and route has {}",
                    self.mode.as_deref().unwrap_or_default(),
                    route.mode
                ),
                route_el,
            );
            return;
        }

        if !self.interval_from_master {
            if let Some(route_interval) = route.interval {
                self.interval = Some(match self.interval {
                    Some(interval) => interval.min(route_interval),
                    None => route_interval,
                });
            }
        }

        // Choose minimal id for determinism
        if !self.has_master && (self.id.is_none() || self.id > Some(route.id)) {
            self.id = Some(route.id);
        }

        self.routes.push(route);
        let added = self.routes.len() - 1;
        let replace = match self.best {
            None => true,
            Some(best) => {
                self.routes[added].stops.len() > self.routes[best].stops.len()
                    || (self.routes[added].stops.len() == self.routes[best].stops.len()
                        && self.routes[added].id.id < self.routes[best].id.id)
            }
        };
        if replace {
            self.best = Some(added);
        }
    }

    fn get_meaningful_routes(&self) -> Vec<usize> {
        (0..self.routes.len())
            .filter(|i| self.routes[*i].stops.len() >= 2)
            .collect()
    }

    /// Checks that each variant has a return direction, and that twin
    /// variants do not miss each other's stations.
    pub fn check_return_routes(
        &self,
        stop_areas: &BTreeMap<ElementId, StopArea>,
        stations: &BTreeMap<ElementId, crate::Station>,
        elements: &BTreeMap<ElementId, Element>,
        log: &mut ValidationLog,
    ) {
        let meaningful = self.get_meaningful_routes();

        if meaningful.is_empty() {
            log.error(
                format!(
                    "An empty route master {}. Please set construction:route if it is under \
                     construction",
                    self.id_str()
                ),
                None,
            );
        } else if meaningful.len() == 1 {
            let best = &self.routes[meaningful[0]];
            let text =
                "Only one route in route_master. Please check if it needs a return route";
            if best.is_circular {
                log.notice(text, elements.get(&best.id));
            } else {
                log.error(text, elements.get(&best.id));
            }
        } else {
            self.check_return_circular_routes(stop_areas, elements, log);
            self.check_return_noncircular_routes(stop_areas, stations, elements, log);
        }
    }

    fn check_return_noncircular_routes(
        &self,
        stop_areas: &BTreeMap<ElementId, StopArea>,
        stations: &BTreeMap<ElementId, crate::Station>,
        elements: &BTreeMap<ElementId, Element>,
        log: &mut ValidationLog,
    ) {
        let routes: Vec<usize> = self
            .get_meaningful_routes()
            .into_iter()
            .filter(|i| !self.routes[*i].is_circular)
            .collect();
        let all_ends: BTreeSet<(ElementId, ElementId)> = routes
            .iter()
            .map(|i| self.routes[*i].get_end_transfers(stop_areas))
            .collect();
        for i in &routes {
            let (a, b) = self.routes[*i].get_end_transfers(stop_areas);
            if !all_ends.contains(&(b, a)) {
                log.notice(
                    "Route does not have a return direction",
                    elements.get(&self.routes[*i].id),
                );
            }
        }

        let twin_routes = self.find_twin_routes(stop_areas);
        for (&route1, &route2) in &twin_routes {
            // Process a pair of routes only once, in id order
            if self.routes[route1].id.id > self.routes[route2].id.id {
                continue;
            }
            self.alert_twin_routes_differ(route1, route2, stop_areas, stations, elements, log);
        }
    }

    /// Two non-circular routes are twins if they share end transfers in
    /// opposite directions and have nearly the same station count. Among
    /// candidates the one minimizing the symmetric difference of transfer
    /// sequences wins; ties prefer the smallest id.
    fn find_twin_routes(
        &self,
        stop_areas: &BTreeMap<ElementId, StopArea>,
    ) -> BTreeMap<usize, usize> {
        let mut twin_routes: BTreeMap<usize, usize> = BTreeMap::new();

        for route_idx in self.get_meaningful_routes() {
            let route = &self.routes[route_idx];
            if route.is_circular || twin_routes.contains_key(&route_idx) {
                continue;
            }
            let route_transfer_ids: BTreeSet<ElementId> =
                route.get_transfers_sequence(stop_areas).into_iter().collect();
            let ends = route.get_end_transfers(stop_areas);
            let ends_reversed = (ends.1, ends.0);

            let mut twin_candidates: Vec<usize> = (0..self.routes.len())
                .filter(|i| {
                    let r = &self.routes[*i];
                    r.stops.len() >= 2
                        && !r.is_circular
                        && !twin_routes.contains_key(i)
                        && r.get_end_transfers(stop_areas) == ends_reversed
                        // A large difference in station count suggests an
                        // express version of the route - skip it.
                        && (diff(r.stops.len(), route.stops.len()) <= 2
                            || (diff(r.stops.len(), route.stops.len()) as f64)
                                / (r.stops.len().max(route.stops.len()) as f64)
                                <= 0.2)
                })
                .collect();
            if twin_candidates.is_empty() {
                continue;
            }
            twin_candidates.sort_by_key(|i| self.routes[*i].id.id);
            let twin = *twin_candidates
                .iter()
                .min_by_key(|i| {
                    let other: BTreeSet<ElementId> = self.routes[**i]
                        .get_transfers_sequence(stop_areas)
                        .into_iter()
                        .collect();
                    route_transfer_ids.symmetric_difference(&other).count()
                })
                .unwrap();
            twin_routes.insert(route_idx, twin);
            twin_routes.insert(twin, route_idx);
        }
        twin_routes
    }

    fn check_return_circular_routes(
        &self,
        stop_areas: &BTreeMap<ElementId, StopArea>,
        elements: &BTreeMap<ElementId, Element>,
        log: &mut ValidationLog,
    ) {
        let routes: Vec<usize> = self
            .get_meaningful_routes()
            .into_iter()
            .filter(|i| self.routes[*i].is_circular)
            .collect();
        let mut routes_having_backward: BTreeSet<usize> = BTreeSet::new();

        for &route_idx in &routes {
            if routes_having_backward.contains(&route_idx) {
                continue;
            }
            let mut sequence1 = self.routes[route_idx].get_transfers_sequence(stop_areas);
            sequence1.pop();
            for &other_idx in routes.iter().filter(|i| **i != route_idx) {
                // Truncate the repeated first stop and reverse
                let mut sequence2 = self.routes[other_idx].get_transfers_sequence(stop_areas);
                sequence2.pop();
                sequence2.reverse();
                let common = find_common_circular_subsequence(&sequence1, &sequence2);
                if common.len() as f64 >= 0.8 * sequence1.len().min(sequence2.len()) as f64 {
                    routes_having_backward.insert(route_idx);
                    routes_having_backward.insert(other_idx);
                    break;
                }
            }
        }

        for &route_idx in &routes {
            if !routes_having_backward.contains(&route_idx) {
                log.notice(
                    "Route does not have a return direction",
                    elements.get(&self.routes[route_idx].id),
                );
            }
        }
    }

    fn alert_twin_routes_differ(
        &self,
        route1: usize,
        route2: usize,
        stop_areas: &BTreeMap<ElementId, StopArea>,
        stations: &BTreeMap<ElementId, crate::Station>,
        elements: &BTreeMap<ElementId, Element>,
        log: &mut ValidationLog,
    ) {
        let r1 = &self.routes[route1];
        let r2 = &self.routes[route2];
        let (missing_from_route1, missing_from_route2, stops_that_dont_match) =
            calculate_twin_routes_diff(r1, r2, stop_areas);

        for st in missing_from_route1 {
            if self.twin_stop_projects_onto(st, r1, stop_areas) {
                log.notice(
                    format!(
                        "Stop {} {} is included in the {} but not included in {}",
                        stations[&stop_areas[&st.stoparea_id].station_id].name,
                        st.stop,
                        r2.id,
                        r1.id
                    ),
                    elements.get(&r1.id),
                );
            }
        }
        for st in missing_from_route2 {
            if self.twin_stop_projects_onto(st, r2, stop_areas) {
                log.notice(
                    format!(
                        "Stop {} {} is included in the {} but not included in {}",
                        stations[&stop_areas[&st.stoparea_id].station_id].name,
                        st.stop,
                        r1.id,
                        r2.id
                    ),
                    elements.get(&r2.id),
                );
            }
        }
        for (st1, st2) in stops_that_dont_match {
            let sa1 = &stop_areas[&st1.stoparea_id];
            let sa2 = &stop_areas[&st2.stoparea_id];
            if sa1.station_id == sa2.station_id
                || st1.stop.gps_dist_meters(st2.stop) < SUGGEST_TRANSFER_MIN_DISTANCE
            {
                log.notice(
                    format!(
                        "Should there be one stoparea or a transfer between {} {} and {} {}?",
                        stations[&sa1.station_id].name,
                        st1.stop,
                        stations[&sa2.station_id].name,
                        st2.stop
                    ),
                    elements.get(&r1.id),
                );
            }
        }
    }

    /// A missing stop is reportable if the other route's tracks are
    /// incomplete, or the stop projects onto them close enough.
    fn twin_stop_projects_onto(
        &self,
        st: &RouteStop,
        route: &Route,
        stop_areas: &BTreeMap<ElementId, StopArea>,
    ) -> bool {
        if !route.are_tracks_complete() {
            return true;
        }
        let center = stop_areas[&st.stoparea_id].center;
        project_on_line(center, &route.tracks)
            .map(|p| center.gps_dist_meters(p.projected_point) <= MAX_DISTANCE_STOP_TO_LINE)
            .unwrap_or(false)
    }
}

fn diff(a: usize, b: usize) -> usize {
    a.max(b) - a.min(b)
}

/// The longest common subsequence of two circular stop sequences, assuming
/// no repeated elements and preserved order. A linear scan after aligning on
/// the first shared element is sufficient; no LCS machinery needed.
pub fn find_common_circular_subsequence<T: PartialEq + Clone>(seq1: &[T], seq2: &[T]) -> Vec<T> {
    let mut start1 = None;
    let mut start2 = None;
    for (i1, x) in seq1.iter().enumerate() {
        if let Some(i2) = seq2.iter().position(|y| y == x) {
            start1 = Some(i1);
            start2 = Some(i2);
            break;
        }
    }
    let (start1, start2) = match (start1, start2) {
        (Some(a), Some(b)) => (a, b),
        _ => return Vec::new(),
    };

    // Shift cyclically so the common element comes first in both
    let seq1: Vec<T> = seq1[start1..]
        .iter()
        .chain(seq1[..start1].iter())
        .cloned()
        .collect();
    let seq2: Vec<T> = seq2[start2..]
        .iter()
        .chain(seq2[..start2].iter())
        .cloned()
        .collect();

    let mut common = Vec::new();
    let mut i2 = 0;
    for x in &seq1 {
        if let Some(found) = seq2[i2..].iter().position(|y| y == x) {
            common.push(x.clone());
            i2 += found + 1;
            if i2 >= seq2.len() {
                break;
            }
        }
    }
    common
}

/// Wagner-Fischer diff over the stop sequences of two twin routes (the
/// second reversed). Returns stops missing from each route and positionally
/// aligned stops that differ.
fn calculate_twin_routes_diff<'a>(
    route1: &'a Route,
    route2: &'a Route,
    stop_areas: &BTreeMap<ElementId, StopArea>,
) -> (
    Vec<&'a RouteStop>,
    Vec<&'a RouteStop>,
    Vec<(&'a RouteStop, &'a RouteStop)>,
) {
    let stops1: Vec<&RouteStop> = route1.stops.iter().collect();
    let stops2: Vec<&RouteStop> = route2.stops.iter().rev().collect();

    let stops_match = |stop1: &RouteStop, stop2: &RouteStop| -> bool {
        let sa1 = &stop_areas[&stop1.stoparea_id];
        let sa2 = &stop_areas[&stop2.stoparea_id];
        sa1.id == sa2.id || (sa1.transfer.is_some() && sa1.transfer == sa2.transfer)
    };

    let mut d = vec![vec![0usize; stops2.len() + 1]; stops1.len() + 1];
    for (j, cell) in d[0].iter_mut().enumerate() {
        *cell = j;
    }
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for i in 1..=stops1.len() {
        for j in 1..=stops2.len() {
            d[i][j] = if stops_match(stops1[i - 1], stops2[j - 1]) {
                d[i - 1][j - 1]
            } else {
                d[i - 1][j].min(d[i][j - 1]).min(d[i - 1][j - 1]) + 1
            };
        }
    }

    let mut missing_from_route1 = Vec::new();
    let mut missing_from_route2 = Vec::new();
    let mut stops_that_dont_match = Vec::new();

    #[derive(PartialEq)]
    enum Action {
        NoChange,
        Change,
        Add1,
        Add2,
    }

    let mut i = stops1.len();
    let mut j = stops2.len();
    while !(i == 0 && j == 0) {
        let mut action = None;
        if i > 0 && j > 0 {
            let matched = stops_match(stops1[i - 1], stops2[j - 1]);
            if matched && d[i - 1][j - 1] == d[i][j] {
                action = Some(Action::NoChange);
            } else if !matched && d[i - 1][j - 1] + 1 == d[i][j] {
                action = Some(Action::Change);
            }
        }
        if action.is_none() && i > 0 && d[i - 1][j] + 1 == d[i][j] {
            action = Some(Action::Add2);
        }
        if action.is_none() && j > 0 && d[i][j - 1] + 1 == d[i][j] {
            action = Some(Action::Add1);
        }

        match action {
            Some(Action::Add1) => {
                missing_from_route1.push(stops2[j - 1]);
                j -= 1;
            }
            Some(Action::Add2) => {
                missing_from_route2.push(stops1[i - 1]);
                i -= 1;
            }
            other => {
                if other == Some(Action::Change) {
                    stops_that_dont_match.push((stops1[i - 1], stops2[j - 1]));
                }
                i -= 1;
                j -= 1;
            }
        }
    }
    (
        missing_from_route1,
        missing_from_route2,
        stops_that_dont_match,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_common_circular_subsequence() {
        let seq1 = vec![1, 2, 3, 4, 5];
        // Same loop, different starting point
        let seq2 = vec![3, 4, 5, 1, 2];
        assert_eq!(
            find_common_circular_subsequence(&seq1, &seq2),
            vec![1, 2, 3, 4, 5]
        );

        // One station skipped
        let seq2 = vec![4, 5, 1, 2];
        assert_eq!(
            find_common_circular_subsequence(&seq1, &seq2),
            vec![1, 2, 4, 5]
        );

        // Nothing in common
        let seq2 = vec![6, 7];
        assert!(find_common_circular_subsequence(&seq1, &seq2).is_empty());
    }
}
