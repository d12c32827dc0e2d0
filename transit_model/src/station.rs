use std::collections::BTreeSet;

use anyhow::Result;

use geom::LonLat;
use osm_reader::{Element, ElementId};

use crate::colours::normalize_colour;
use crate::validation::ValidationLog;
use crate::{all_modes, CONSTRUCTION_KEYS};

/// A physical station, derived from one `railway=station|halt` (or
/// `railway=tram_stop`) element. Always has a center; construction fails
/// otherwise.
#[derive(Clone, Debug)]
pub struct Station {
    pub id: ElementId,
    pub name: String,
    pub int_name: Option<String>,
    pub modes: BTreeSet<String>,
    pub colour: Option<String>,
    pub center: LonLat,
}

impl Station {
    /// Transit modes the element claims: the `station=...` tag plus any
    /// per-mode `subway=yes` style tags.
    pub fn get_modes(el: &Element) -> BTreeSet<String> {
        let mut modes: BTreeSet<String> = all_modes()
            .filter(|m| el.tags.is(m, "yes"))
            .map(|m| m.to_string())
            .collect();
        if let Some(mode) = el.tags.get("station") {
            modes.insert(mode.clone());
        }
        modes
    }

    /// Whether this element counts as a station for the given mode set.
    /// public_transport=station is too ambiguous and unspecific to use, so
    /// we expect it to be backed by railway=station.
    pub fn is_station(el: &Element, modes: &BTreeSet<String>) -> bool {
        if modes.contains("tram") && el.tags.is("railway", "tram_stop") {
            return true;
        }
        if !el.tags.is_any("railway", vec!["station", "halt"]) {
            return false;
        }
        for k in CONSTRUCTION_KEYS {
            if el.tags.contains_key(k) {
                return false;
            }
        }
        // Not checking for station=train, obviously
        if !modes.contains("train") && Station::get_modes(el).is_disjoint(modes) {
            return false;
        }
        true
    }

    pub fn new(el: &Element, log: &mut ValidationLog) -> Result<Station> {
        let colour = match el.tags.get("colour") {
            Some(value) => match normalize_colour(value) {
                Ok(c) => Some(c),
                Err(err) => {
                    log.warn(err.to_string(), Some(el));
                    None
                }
            },
            None => None,
        };
        let center = el
            .center()
            .ok_or_else(|| anyhow!("Could not find center of {}", el.id))?;
        Ok(Station {
            id: el.id,
            name: el.tags.get("name").cloned().unwrap_or_else(|| "?".to_string()),
            int_name: el
                .tags
                .get("int_name")
                .or_else(|| el.tags.get("name:en"))
                .cloned(),
            modes: Station::get_modes(el),
            colour,
            center,
        })
    }
}
