use std::collections::BTreeSet;

use anyhow::{Context, Result};

use transit_model::{City, CityRow};

/// Loads the cities table from a local path or an URL. Rows with an empty
/// id or bbox are skipped; the header row is ignored. The count columns
/// hold stations/lines/light-lines/interchanges for rapid-transit tables
/// and tram/trolleybus/bus/other line counts for overground ones.
pub fn load_cities(cities_info_url: &str, overground: bool) -> Result<Vec<City>> {
    let data = if cities_info_url.starts_with("http://") || cities_info_url.starts_with("https://")
    {
        reqwest::blocking::get(cities_info_url)
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to download cities spreadsheet {}", cities_info_url))?
            .text()?
    } else {
        String::from_utf8(fs_err::read(cities_info_url)?)?
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data.as_bytes());

    let mut cities = Vec::new();
    let mut names: BTreeSet<String> = BTreeSet::new();
    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();
        let mut row = CityRow {
            id: field(0),
            name: field(1),
            country: field(2),
            continent: field(3),
            bbox: field(8),
            networks: field(9),
            ..Default::default()
        };
        if overground {
            row.num_tram_lines = field(4);
            row.num_trolleybus_lines = field(5);
            row.num_bus_lines = field(6);
            row.num_other_lines = field(7);
        } else {
            row.num_stations = field(4);
            row.num_lines = field(5);
            row.num_light_lines = field(6);
            row.num_interchanges = field(7);
        }
        if row.id.is_empty() || row.bbox.is_empty() {
            continue;
        }
        if !names.insert(row.name.clone()) {
            warn!("Duplicate city name in city list: {}", row.name);
        }
        cities.push(City::new(row, overground));
    }
    Ok(cities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_cities() {
        let csv_data = "id,name,country,continent,num_stations,num_lines,num_light_lines,\
num_interchanges,bbox,networks\n\
1,Moscow,Russia,Europe,250,14,1,25,\"55.5,37.3,56.0,38.0\",\
\"subway,light_rail:Московский метрополитен\"\n\
2,Nowhere,Utopia,Atlantis,10,1,0,0,,\n\
,Skipme,X,Y,1,1,0,0,\"0,0,1,1\",\n";
        let path = std::env::temp_dir().join("cities_test.csv");
        fs_err::write(&path, csv_data).unwrap();

        let cities = load_cities(path.to_str().unwrap(), false).unwrap();
        // The row without a bbox and the row without an id are skipped
        assert_eq!(cities.len(), 1);
        let city = &cities[0];
        assert_eq!(city.name, "Moscow");
        assert_eq!(city.id, Some(1));
        assert_eq!(city.num_stations, 250);
        assert_eq!(city.num_lines, 14);
        assert_eq!(
            city.networks,
            ["Московский метрополитен".to_string()].into_iter().collect()
        );
        assert_eq!(
            city.modes,
            ["subway".to_string(), "light_rail".to_string()]
                .into_iter()
                .collect()
        );
        let bbox = city.bbox.unwrap();
        assert_eq!(bbox.min_lat, 55.5);
        assert_eq!(bbox.max_lon, 38.0);
    }
}
