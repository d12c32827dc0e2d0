use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use transit_model::{City, RecoveryItinerary, RecoveryStation};

/// Reads the recovery file: a JSON map of city name to the itineraries of
/// the previous run. A missing file just means no recovery data yet.
pub fn read_recovery_data(path: &str) -> Result<BTreeMap<String, Vec<RecoveryItinerary>>> {
    if !Path::new(path).exists() {
        info!("Recovery file {} does not exist yet", path);
        return Ok(BTreeMap::new());
    }
    let bytes = fs_err::read(path)?;
    match serde_json::from_slice(&bytes) {
        Ok(data) => Ok(data),
        Err(err) => {
            warn!("Cannot read recovery data from {}: {}", path, err);
            Ok(BTreeMap::new())
        }
    }
}

/// Rewrites the recovery file with itineraries of the validated cities;
/// cities that failed this run keep their previous entries.
pub fn write_recovery_data(
    path: &str,
    mut data: BTreeMap<String, Vec<RecoveryItinerary>>,
    cities: &[City],
) -> Result<()> {
    for city in cities.iter().filter(|c| c.is_good()) {
        data.insert(city.name.clone(), city_itineraries(city));
    }
    fs_err::write(path, serde_json::to_vec(&data)?)?;
    Ok(())
}

fn city_itineraries(city: &City) -> Vec<RecoveryItinerary> {
    let mut itineraries = Vec::new();
    for route_master in city.routes.values() {
        for route in &route_master.routes {
            let stations = route
                .stops
                .iter()
                .map(|stop| {
                    let station = &city.stations[&city.stop_areas[&stop.stoparea_id].station_id];
                    let name = if station.name == "?" {
                        station.int_name.clone().unwrap_or_else(|| station.name.clone())
                    } else {
                        station.name.clone()
                    };
                    RecoveryStation {
                        name,
                        center: station.center,
                    }
                })
                .collect();
            itineraries.push(RecoveryItinerary {
                colour: route.colour.clone(),
                ref_: route.ref_.clone(),
                from: route.from.clone(),
                to: route.to.clone(),
                stations,
            });
        }
    }
    itineraries
}
