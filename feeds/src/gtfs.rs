use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;

use geom::LonLat;

use crate::transit_data::TransitData;
use crate::{format_colour, DEFAULT_INTERVAL, SPEED_ON_TRANSFER, TRANSFER_PENALTY};

const DEFAULT_TRIP_START_TIME: (u32, u32) = (5, 0); // 05:00
const DEFAULT_TRIP_END_TIME: (u32, u32) = (1, 0); // 01:00

/// OSM precision, ~5 cm.
const COORDINATE_PRECISION: i32 = 7;

const GTFS_COLUMNS: [(&str, &[&str]); 9] = [
    (
        "agency",
        &[
            "agency_id",
            "agency_name",
            "agency_url",
            "agency_timezone",
            "agency_lang",
            "agency_phone",
        ],
    ),
    (
        "routes",
        &[
            "route_id",
            "agency_id",
            "route_short_name",
            "route_long_name",
            "route_desc",
            "route_type",
            "route_url",
            "route_color",
            "route_text_color",
            "route_sort_order",
            "route_fare_class",
            "line_id",
            "listed_route",
        ],
    ),
    (
        "trips",
        &[
            "route_id",
            "service_id",
            "trip_id",
            "trip_headsign",
            "trip_short_name",
            "direction_id",
            "block_id",
            "shape_id",
            "wheelchair_accessible",
            "trip_route_type",
            "route_pattern_id",
            "bikes_allowed",
        ],
    ),
    (
        "stops",
        &[
            "stop_id",
            "stop_code",
            "stop_name",
            "stop_desc",
            "platform_code",
            "platform_name",
            "stop_lat",
            "stop_lon",
            "zone_id",
            "stop_address",
            "stop_url",
            "level_id",
            "location_type",
            "parent_station",
            "wheelchair_boarding",
            "municipality",
            "on_street",
            "at_street",
            "vehicle_type",
        ],
    ),
    (
        "calendar",
        &[
            "service_id",
            "monday",
            "tuesday",
            "wednesday",
            "thursday",
            "friday",
            "saturday",
            "sunday",
            "start_date",
            "end_date",
        ],
    ),
    (
        "stop_times",
        &[
            "trip_id",
            "arrival_time",
            "departure_time",
            "stop_id",
            "stop_sequence",
            "stop_headsign",
            "pickup_type",
            "drop_off_type",
            "shape_dist_traveled",
            "timepoint",
            "checkpoint_id",
            "continuous_pickup",
            "continuous_drop_off",
        ],
    ),
    (
        "frequencies",
        &[
            "trip_id",
            "start_time",
            "end_time",
            "headway_secs",
            "exact_times",
        ],
    ),
    (
        "shapes",
        &[
            "shape_id",
            "shape_pt_lat",
            "shape_pt_lon",
            "shape_pt_sequence",
            "shape_dist_traveled",
        ],
    ),
    (
        "transfers",
        &[
            "from_stop_id",
            "to_stop_id",
            "transfer_type",
            "min_transfer_time",
        ],
    ),
];

type Row = Vec<String>;

/// Fills a row in the fixed column order of the given table; columns with
/// no value become empty strings.
fn dict_to_row(values: &BTreeMap<&str, String>, record_type: &str) -> Row {
    let columns = GTFS_COLUMNS
        .iter()
        .find(|(name, _)| *name == record_type)
        .map(|(_, columns)| *columns)
        .unwrap_or(&[]);
    columns
        .iter()
        .map(|column| values.get(column).cloned().unwrap_or_default())
        .collect()
}

fn round_coord(value: f64) -> f64 {
    let factor = 10f64.powi(COORDINATE_PRECISION);
    (value * factor).round() / factor
}

fn format_gtfs_time((hours, minutes): (u32, u32)) -> String {
    format!("{:02}:{:02}:00", hours, minutes)
}

/// Projects the intermediate data to the GTFS tables and saves them as a
/// ZIP archive of .txt files.
pub fn process(data: &TransitData, filename: &str) -> Result<()> {
    let mut gtfs_data: BTreeMap<&str, Vec<Row>> =
        GTFS_COLUMNS.iter().map(|(name, _)| (*name, Vec::new())).collect();

    gtfs_data.get_mut("calendar").unwrap().push(dict_to_row(
        &BTreeMap::from([
            ("service_id", "always".to_string()),
            ("monday", "1".to_string()),
            ("tuesday", "1".to_string()),
            ("wednesday", "1".to_string()),
            ("thursday", "1".to_string()),
            ("friday", "1".to_string()),
            ("saturday", "1".to_string()),
            ("sunday", "1".to_string()),
            ("start_date", "19700101".to_string()),
            ("end_date", "30000101".to_string()),
        ]),
        "calendar",
    ));

    // Stop (stop area) id -> its stops.txt rows; a stop area expands into a
    // station, a platform and one or more egresses.
    let mut all_stops: BTreeMap<String, Vec<Row>> = BTreeMap::new();

    let mut add_stop_gtfs = |stoparea_id: &str, data: &TransitData| -> String {
        let station_id = format!("{}_st", stoparea_id);
        let platform_id = format!("{}_plt", stoparea_id);
        if !all_stops.contains_key(stoparea_id) {
            let sa = &data.stopareas[stoparea_id];
            let station_name = sa.name.clone();
            let lat = round_coord(sa.center.lat).to_string();
            let lon = round_coord(sa.center.lon).to_string();

            let mut rows = Vec::new();
            rows.push(dict_to_row(
                &BTreeMap::from([
                    ("stop_id", station_id.clone()),
                    ("stop_code", station_id.clone()),
                    ("stop_name", station_name.clone()),
                    ("stop_lat", lat.clone()),
                    ("stop_lon", lon.clone()),
                    // Station, in GTFS terms
                    ("location_type", "1".to_string()),
                ]),
                "stops",
            ));
            rows.push(dict_to_row(
                &BTreeMap::from([
                    ("stop_id", platform_id.clone()),
                    ("stop_code", platform_id.clone()),
                    ("stop_name", station_name.clone()),
                    ("stop_lat", lat.clone()),
                    ("stop_lon", lon.clone()),
                    // Stop/platform, in GTFS terms
                    ("location_type", "0".to_string()),
                    ("parent_station", station_id.clone()),
                ]),
                "stops",
            ));

            if sa.entrances.is_empty() {
                let entrance_id = format!("{}_egress", stoparea_id);
                rows.push(dict_to_row(
                    &BTreeMap::from([
                        ("stop_id", entrance_id.clone()),
                        ("stop_code", entrance_id),
                        ("stop_name", station_name),
                        ("stop_lat", lat),
                        ("stop_lon", lon),
                        ("location_type", "2".to_string()),
                        ("parent_station", station_id.clone()),
                    ]),
                    "stops",
                ));
            } else {
                for egress in &sa.entrances {
                    let entrance_id = format!("{}_{}", egress.id, stoparea_id);
                    let entrance_name = match &egress.name {
                        Some(name) => name.clone(),
                        None => match &egress.ref_ {
                            Some(r) => format!("{} {}", station_name, r),
                            None => station_name.clone(),
                        },
                    };
                    rows.push(dict_to_row(
                        &BTreeMap::from([
                            ("stop_id", entrance_id.clone()),
                            ("stop_code", entrance_id),
                            ("stop_name", entrance_name),
                            ("stop_lat", round_coord(egress.center.lat).to_string()),
                            ("stop_lon", round_coord(egress.center.lon).to_string()),
                            ("location_type", "2".to_string()),
                            ("parent_station", station_id.clone()),
                        ]),
                        "stops",
                    ));
                }
            }
            all_stops.insert(stoparea_id.to_string(), rows);
        }
        platform_id
    };

    for network in data.networks.values() {
        let agency_id = network.id.map(|id| id.to_string()).unwrap_or_default();
        gtfs_data.get_mut("agency").unwrap().push(dict_to_row(
            &BTreeMap::from([
                ("agency_id", agency_id.clone()),
                ("agency_name", network.name.clone()),
            ]),
            "agency",
        ));

        for route in &network.routes {
            let route_type = if route.mode == "monorail" { "12" } else { "1" };
            gtfs_data.get_mut("routes").unwrap().push(dict_to_row(
                &BTreeMap::from([
                    ("route_id", route.id.clone()),
                    ("agency_id", agency_id.clone()),
                    ("route_type", route_type.to_string()),
                    ("route_short_name", route.ref_.clone().unwrap_or_default()),
                    ("route_long_name", route.name.clone().unwrap_or_default()),
                    (
                        "route_color",
                        format_colour(route.colour.as_ref()).unwrap_or_default(),
                    ),
                ]),
                "routes",
            ));

            for variant in &route.itineraries {
                // Truncate the leading type letter
                let shape_id = variant.id[1..].to_string();
                gtfs_data.get_mut("trips").unwrap().push(dict_to_row(
                    &BTreeMap::from([
                        ("trip_id", variant.id.clone()),
                        ("route_id", route.id.clone()),
                        ("service_id", "always".to_string()),
                        ("shape_id", shape_id.clone()),
                    ]),
                    "trips",
                ));

                for (i, pt) in variant.tracks.iter().enumerate() {
                    gtfs_data.get_mut("shapes").unwrap().push(dict_to_row(
                        &BTreeMap::from([
                            ("shape_id", shape_id.clone()),
                            ("trip_id", variant.id.clone()),
                            ("shape_pt_lat", round_coord(pt.lat).to_string()),
                            ("shape_pt_lon", round_coord(pt.lon).to_string()),
                            ("shape_pt_sequence", i.to_string()),
                        ]),
                        "shapes",
                    ));
                }

                let start_time = variant.start_time.unwrap_or(DEFAULT_TRIP_START_TIME);
                let mut end_time = variant.end_time.unwrap_or(DEFAULT_TRIP_END_TIME);
                if end_time <= start_time {
                    end_time = (end_time.0 + 24, end_time.1);
                }
                gtfs_data.get_mut("frequencies").unwrap().push(dict_to_row(
                    &BTreeMap::from([
                        ("trip_id", variant.id.clone()),
                        ("start_time", format_gtfs_time(start_time)),
                        ("end_time", format_gtfs_time(end_time)),
                        (
                            "headway_secs",
                            variant
                                .interval
                                .map(|x| x as u64)
                                .unwrap_or(DEFAULT_INTERVAL)
                                .to_string(),
                        ),
                    ]),
                    "frequencies",
                ));

                for (stop_sequence, stop) in variant.stops.iter().enumerate() {
                    let gtfs_platform_id = add_stop_gtfs(&stop.stoparea_id, data);
                    gtfs_data.get_mut("stop_times").unwrap().push(dict_to_row(
                        &BTreeMap::from([
                            ("trip_id", variant.id.clone()),
                            ("stop_sequence", stop_sequence.to_string()),
                            ("shape_dist_traveled", stop.distance.to_string()),
                            ("stop_id", gtfs_platform_id),
                        ]),
                        "stop_times",
                    ));
                }
            }
        }
    }

    let stops_table = gtfs_data.get_mut("stops").unwrap();
    for rows in all_stops.values() {
        stops_table.extend(rows.iter().cloned());
    }

    for (id1, id2) in &data.transfers {
        let transfer_time =
            transfer_time(data.stopareas[id1].center, data.stopareas[id2].center);
        let stop1_id = format!("{}_st", id1);
        let stop2_id = format!("{}_st", id2);
        for (from, to) in [(&stop1_id, &stop2_id), (&stop2_id, &stop1_id)] {
            gtfs_data.get_mut("transfers").unwrap().push(dict_to_row(
                &BTreeMap::from([
                    ("from_stop_id", from.clone()),
                    ("to_stop_id", to.clone()),
                    ("transfer_type", "0".to_string()),
                    ("min_transfer_time", transfer_time.to_string()),
                ]),
                "transfers",
            ));
        }
    }

    make_gtfs(filename, &gtfs_data)
}

fn make_gtfs(filename: &str, gtfs_data: &BTreeMap<&str, Vec<Row>>) -> Result<()> {
    let filename = if filename.to_lowercase().ends_with("zip") {
        filename.to_string()
    } else {
        format!("{}.zip", filename)
    };

    let file = fs_err::File::create(&filename)?;
    let mut zf = zip::ZipWriter::new(file);
    for (gtfs_feature, columns) in &GTFS_COLUMNS {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(*columns)?;
        for row in &gtfs_data[gtfs_feature] {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("flushing {}.txt: {}", gtfs_feature, err))?;
        zf.start_file(format!("{}.txt", gtfs_feature), Default::default())?;
        zf.write_all(&bytes)?;
    }
    zf.finish()?;
    info!("Wrote GTFS feed to {}", filename);
    Ok(())
}

/// Straight-line transfer time with the walking-speed penalty, exposed for
/// tests.
pub fn transfer_time(center1: LonLat, center2: LonLat) -> u64 {
    TRANSFER_PENALTY + (center1.gps_dist_meters(center2) / SPEED_ON_TRANSFER).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_to_row_pads_missing_columns() {
        let row = dict_to_row(
            &BTreeMap::from([
                ("service_id", "always".to_string()),
                ("monday", "1".to_string()),
            ]),
            "calendar",
        );
        assert_eq!(row.len(), 10);
        assert_eq!(row[0], "always");
        assert_eq!(row[1], "1");
        assert_eq!(row[2], "");

        // Unknown keys never leak into a row
        let row = dict_to_row(&BTreeMap::from([("bogus", "x".to_string())]), "frequencies");
        assert_eq!(row, vec!["", "", "", "", ""]);
    }

    #[test]
    fn test_round_coord() {
        assert_eq!(round_coord(37.12345678), 37.1234568);
        assert_eq!(round_coord(-0.000000049), -0.0);
    }

    #[test]
    fn test_format_gtfs_time() {
        assert_eq!(format_gtfs_time((5, 0)), "05:00:00");
        assert_eq!(format_gtfs_time((25, 30)), "25:30:00");
    }
}
