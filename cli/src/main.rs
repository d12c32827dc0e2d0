//! The orchestrator: loads the cities table, obtains OSM data (from a JSON
//! cache, an XML extract or the Overpass API), sorts elements into cities,
//! validates each city in sequence and emits the outputs.

#[macro_use]
extern crate log;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use structopt::StructOpt;

use osm_reader::{calculate_centers, Element, ElementId, ElementKind};
use transit_model::{
    add_osm_elements_to_cities, find_transfers, validate_cities, City, ValidationResult,
};

mod cities;
mod overpass;
mod recovery_io;

/// Reference information about rapid transit networks of the world.
const DEFAULT_CITIES_INFO_URL: &str = "https://docs.google.com/spreadsheets/d/\
     1SEW1-NiNOnA2qDwievcxYV1FOaQl1mb1fdeyqAxHu3k/export?format=csv";

/// If the Overpass API would be queried for more cities than this in one
/// run, give up instead.
const MAX_CITIES_FOR_OVERPASS: usize = 10;

#[derive(StructOpt)]
#[structopt(
    name = "transit_validator",
    about = "Reconstructs and validates public transit networks from OSM data."
)]
struct Flags {
    /// URL or path of a CSV file with reference information about rapid
    /// transit networks
    #[structopt(long = "cities-info-url")]
    cities_info_url: Option<String>,

    /// File to write a backup of OSM data, or to read data from
    #[structopt(short = "i", long = "source")]
    source: Option<String>,

    /// OSM extract with routes, to read data from
    #[structopt(short = "x", long = "xml")]
    xml: Option<String>,

    /// Overpass API URL
    #[structopt(
        long = "overpass-api",
        default_value = "http://overpass-api.de/api/interpreter"
    )]
    overpass_api: String,

    /// Show only warnings and errors
    #[structopt(short = "q", long = "quiet")]
    quiet: bool,

    /// Process overground transport instead of subways
    #[structopt(short = "t", long = "overground")]
    overground: bool,

    /// Validate only a single city or a country
    #[structopt(short = "c", long = "city")]
    city: Option<String>,

    /// Export unused subway entrances as GeoJSON here
    #[structopt(short = "e", long = "entrances")]
    entrances: Option<String>,

    /// Validation JSON file name
    #[structopt(short = "l", long = "log")]
    log: Option<String>,

    /// Processed metro systems output filename in GTFS format
    #[structopt(long = "output-gtfs")]
    output_gtfs: Option<String>,

    /// Processed metro systems output filename in routing JSON format
    #[structopt(long = "output-routing")]
    output_routing: Option<String>,

    /// Cache file name for error recovery
    #[structopt(short = "r", long = "recovery-path")]
    recovery_path: Option<String>,
}

fn main() {
    let flags = Flags::from_args();
    if flags.quiet {
        util::logger::setup_with_filter("warn");
    } else {
        util::logger::setup();
    }

    match run(flags) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("{:?}", err);
            std::process::exit(1);
        }
    }
}

fn run(flags: Flags) -> Result<i32> {
    let cities_info_url = flags
        .cities_info_url
        .clone()
        .unwrap_or_else(|| DEFAULT_CITIES_INFO_URL.to_string());
    let mut cities = cities::load_cities(&cities_info_url, flags.overground)?;
    if let Some(filter) = &flags.city {
        cities.retain(|c| &c.name == filter || &c.country == filter);
    }
    if cities.is_empty() {
        error!("No cities to process");
        return Ok(2);
    }

    // Augment cities with recovery data
    let mut recovery_data = BTreeMap::new();
    if let Some(path) = &flags.recovery_path {
        recovery_data = recovery_io::read_recovery_data(path)?;
        for city in &mut cities {
            city.recovery_data = recovery_data
                .get(&city.name)
                .cloned()
                .map(|itineraries| itineraries.into());
        }
    }

    info!("Read {} metro networks", cities.len());

    // Reading a cached json, loading an XML extract or querying Overpass
    let mut elements: Vec<Element>;
    if flags
        .source
        .as_ref()
        .map(|path| Path::new(path).exists())
        .unwrap_or(false)
    {
        let source = flags.source.as_ref().unwrap();
        info!("Reading {}", source);
        elements = osm_reader::read_json(source)?;
        calculate_centers(&mut elements);
    } else if let Some(xml) = &flags.xml {
        info!("Reading {}", xml);
        elements = osm_reader::read_xml(xml)?;
        calculate_centers(&mut elements);
        if let Some(source) = &flags.source {
            osm_reader::write_json(source, &elements)?;
        }
    } else {
        if cities.len() > MAX_CITIES_FOR_OVERPASS {
            error!(
                "Would not download that many cities from Overpass API, choose a smaller set"
            );
            return Ok(3);
        }
        let bboxes: Vec<_> = cities.iter().filter_map(|c| c.bbox).collect();
        info!("Downloading data from Overpass API");
        elements = overpass::multi_overpass(flags.overground, &flags.overpass_api, &bboxes)?;
        calculate_centers(&mut elements);
        if let Some(source) = &flags.source {
            osm_reader::write_json(source, &elements)?;
        }
    }
    info!("Got {} elements", util::prettyprint_usize(elements.len()));

    add_osm_elements_to_cities(&elements, &mut cities);
    validate_cities(&mut cities);

    let good_count = cities.iter().filter(|c| c.is_good()).count();
    info!("{} good cities of {}", good_count, cities.len());

    if let Some(path) = &flags.log {
        let results: Vec<ValidationResult> =
            cities.iter().map(|c| c.get_validation_result()).collect();
        fs_err::write(path, serde_json::to_vec_pretty(&results)?)?;
    }

    let transfers = find_transfers(&elements, &cities);

    if let Some(path) = &flags.output_gtfs {
        let data = feeds::transit_to_dict(&cities, &transfers);
        feeds::gtfs::process(&data, path)?;
    }
    if let Some(path) = &flags.output_routing {
        feeds::routing::process(&cities, &transfers, path)?;
    }

    if let Some(path) = &flags.entrances {
        let geojson = geojson::GeoJson::FeatureCollection(unused_entrances_geojson(
            &elements, &cities,
        ));
        fs_err::write(path, geojson.to_string())?;
    }

    if let Some(path) = &flags.recovery_path {
        recovery_io::write_recovery_data(path, recovery_data, &cities)?;
    }

    Ok(0)
}

/// All subway entrance nodes not serving any station of any city, as a
/// GeoJSON FeatureCollection.
fn unused_entrances_geojson(elements: &[Element], cities: &[City]) -> geojson::FeatureCollection {
    let mut used: BTreeSet<ElementId> = BTreeSet::new();
    for city in cities {
        used.extend(city.used_entrances.iter().copied());
    }

    let mut features = Vec::new();
    for el in elements {
        if el.id.kind != ElementKind::Node
            || !el.tags.is("railway", "subway_entrance")
            || used.contains(&el.id)
        {
            continue;
        }
        let center = match el.center() {
            Some(c) => c,
            None => continue,
        };
        let mut properties = geojson::JsonObject::new();
        for (k, v) in el.tags.iter() {
            if k != "railway" && k != "entrance" {
                properties.insert(k.clone(), serde_json::Value::String(v.clone()));
            }
        }
        features.push(geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                center.lon, center.lat,
            ]))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
