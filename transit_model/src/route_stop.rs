use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use geom::LonLat;
use osm_reader::{Element, ElementId, ElementKind, Member};

use crate::station::Station;
use crate::stop_area::StopArea;
use crate::validation::ValidationLog;

/// What a route member actually is, regardless of its stated role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActualRole {
    Stop,
    Platform,
}

impl ActualRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ActualRole::Stop => "stop",
            ActualRole::Platform => "platform",
        }
    }
}

impl fmt::Display for ActualRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stop occurrence inside a route variant. Several relation members
/// (stop position, platform, station) may collapse into the same RouteStop.
#[derive(Clone, Debug)]
pub struct RouteStop {
    pub stoparea_id: ElementId,
    /// The stop position, possibly adjusted to lie on the tracks. Starts at
    /// the stop area center and gets refined as members are seen.
    pub stop: LonLat,
    /// Meters from the start of the route, assigned post-hoc.
    pub distance: u64,
    pub platform_entry: Option<ElementId>,
    pub platform_exit: Option<ElementId>,
    pub can_enter: bool,
    pub can_exit: bool,
    pub seen_stop: bool,
    pub seen_platform_entry: bool,
    pub seen_platform_exit: bool,
    pub seen_station: bool,
    /// Fractional vertex indices of this stop on the route's tracks, filled
    /// by the projection pass.
    pub positions_on_rails: Vec<f64>,
}

impl RouteStop {
    pub fn new(stoparea: &StopArea) -> RouteStop {
        RouteStop {
            stoparea_id: stoparea.id,
            stop: stoparea.center,
            distance: 0,
            platform_entry: None,
            platform_exit: None,
            can_enter: false,
            can_exit: false,
            seen_stop: false,
            seen_platform_entry: false,
            seen_platform_exit: false,
            seen_station: false,
            positions_on_rails: Vec::new(),
        }
    }

    pub fn seen_platform(&self) -> bool {
        self.seen_platform_entry || self.seen_platform_exit
    }

    /// Classifies a route member into stop or platform from its own tags,
    /// falling back to the stated role for stations.
    pub fn get_actual_role(
        el: &Element,
        role: &str,
        modes: &BTreeSet<String>,
    ) -> Option<ActualRole> {
        if StopArea::is_stop(el) {
            Some(ActualRole::Stop)
        } else if StopArea::is_platform(el) {
            Some(ActualRole::Platform)
        } else if Station::is_station(el, modes) {
            if role.contains("platform") {
                Some(ActualRole::Platform)
            } else {
                Some(ActualRole::Stop)
            }
        } else {
            None
        }
    }

    /// Folds one more relation member into this stop: refines the stop
    /// coordinate, the enter/exit permissions and the duplicate-role
    /// bookkeeping.
    pub fn add(
        &mut self,
        member: &Member,
        relation: &Element,
        elements: &BTreeMap<ElementId, Element>,
        modes: &BTreeSet<String>,
        log: &mut ValidationLog,
    ) {
        let el = &elements[&member.element_id()];
        let role = member.role.as_str();

        if StopArea::is_stop(el) {
            if role.contains("platform") {
                log.warn("Stop position in a platform role in a route", Some(el));
            }
            if el.id.kind != ElementKind::Node {
                log.error("Stop position is not a node", Some(el));
            }
            if let Some(center) = el.center() {
                self.stop = center;
            }
            if !role.contains("entry_only") {
                self.can_exit = true;
            }
            if !role.contains("exit_only") {
                self.can_enter = true;
            }
        } else if Station::is_station(el, modes) {
            if el.id.kind != ElementKind::Node {
                log.notice("Station in route is not a node", Some(el));
            }
            if !self.seen_stop && !self.seen_platform() {
                if let Some(center) = el.center() {
                    self.stop = center;
                }
                self.can_enter = true;
                self.can_exit = true;
            }
        } else if StopArea::is_platform(el) {
            if role.contains("stop") {
                log.warn("Platform in a stop role in a route", Some(el));
            }
            if !role.contains("exit_only") {
                self.platform_entry = Some(el.id);
                self.can_enter = true;
            }
            if !role.contains("entry_only") {
                self.platform_exit = Some(el.id);
                self.can_exit = true;
            }
            if !self.seen_stop {
                if let Some(center) = el.center() {
                    self.stop = center;
                }
            }
        }

        let mut multiple_check = false;
        let actual_role = RouteStop::get_actual_role(el, role, modes);
        match actual_role {
            Some(ActualRole::Platform) => {
                if role == "platform_entry_only" {
                    multiple_check = self.seen_platform_entry;
                    self.seen_platform_entry = true;
                } else if role == "platform_exit_only" {
                    multiple_check = self.seen_platform_exit;
                    self.seen_platform_exit = true;
                } else {
                    if role != "platform" && !role.contains("stop") {
                        log.warn(
                            format!(
                                "Platform \"{}\" ({}) with invalid role \"{}\" in route",
                                el.tags.get("name").cloned().unwrap_or_default(),
                                el.id,
                                role
                            ),
                            Some(relation),
                        );
                    }
                    multiple_check = self.seen_platform();
                    self.seen_platform_entry = true;
                    self.seen_platform_exit = true;
                }
            }
            Some(ActualRole::Stop) => {
                multiple_check = self.seen_stop;
                self.seen_stop = true;
            }
            None => {}
        }
        if multiple_check {
            let text = format!(
                "Multiple {}s for a station \"{}\" ({}) in a route relation",
                actual_role.map(|r| r.as_str()).unwrap_or_default(),
                el.tags.get("name").cloned().unwrap_or_default(),
                el.id
            );
            if actual_role == Some(ActualRole::Stop) {
                log.error(text, Some(relation));
            } else {
                log.notice(text, Some(relation));
            }
        }
    }
}
