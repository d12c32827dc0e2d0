use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use geom::LonLat;

/// A station of a previously validated itinerary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryStation {
    pub name: String,
    pub center: LonLat,
}

/// One itinerary persisted from a previous validator run, used to re-sort
/// stops whose OSM order broke since.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryItinerary {
    pub colour: Option<String>,
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub stations: Vec<RecoveryStation>,
}

/// Recovery data for one city, indexed the only way routes look it up.
#[derive(Clone, Debug, Default)]
pub struct CityRecoveryData {
    by_route: HashMap<(Option<String>, Option<String>), Vec<RecoveryItinerary>>,
}

impl CityRecoveryData {
    pub fn lookup(
        &self,
        colour: &Option<String>,
        ref_: &Option<String>,
    ) -> Option<&Vec<RecoveryItinerary>> {
        self.by_route.get(&(colour.clone(), ref_.clone()))
    }
}

impl From<Vec<RecoveryItinerary>> for CityRecoveryData {
    fn from(itineraries: Vec<RecoveryItinerary>) -> CityRecoveryData {
        let mut data = CityRecoveryData::default();
        for itinerary in itineraries {
            data.by_route
                .entry((itinerary.colour.clone(), itinerary.ref_.clone()))
                .or_default()
                .push(itinerary);
        }
        data
    }
}
