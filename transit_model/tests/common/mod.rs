//! Builders for synthetic OSM networks used across the integration tests.

use geom::LonLat;
use osm_reader::{calculate_centers, Element, ElementData, ElementId, ElementKind, Member, Tags};
use transit_model::{validate_cities, City, CityRow};

pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    let mut t = Tags::new();
    for (k, v) in pairs {
        t.insert(*k, *v);
    }
    t
}

pub fn node(id: i64, lon: f64, lat: f64, tag_pairs: &[(&str, &str)]) -> Element {
    Element {
        id: ElementId::node(id),
        tags: tags(tag_pairs),
        center: None,
        data: ElementData::Node {
            pt: LonLat::new(lon, lat),
        },
    }
}

pub fn way(id: i64, nodes: Vec<i64>, tag_pairs: &[(&str, &str)]) -> Element {
    Element {
        id: ElementId::way(id),
        tags: tags(tag_pairs),
        center: None,
        data: ElementData::Way { nodes },
    }
}

pub fn relation(
    id: i64,
    members: Vec<(ElementKind, i64, &str)>,
    tag_pairs: &[(&str, &str)],
) -> Element {
    Element {
        id: ElementId::relation(id),
        tags: tags(tag_pairs),
        center: None,
        data: ElementData::Relation {
            members: members
                .into_iter()
                .map(|(kind, id, role)| Member {
                    kind,
                    id,
                    role: role.to_string(),
                })
                .collect(),
        },
    }
}

pub fn station(id: i64, lon: f64, lat: f64, name: &str) -> Element {
    node(
        id,
        lon,
        lat,
        &[
            ("name", name),
            ("railway", "station"),
            ("station", "subway"),
        ],
    )
}

pub fn rail(id: i64, nodes: Vec<i64>) -> Element {
    way(id, nodes, &[("railway", "subway")])
}

/// A subway route relation with the given members; stations go in with an
/// empty role, ways with an empty role too.
pub fn route(id: i64, ref_: &str, name: &str, members: Vec<(ElementKind, i64, &str)>) -> Element {
    relation(
        id,
        members,
        &[
            ("name", name),
            ("ref", ref_),
            ("route", "subway"),
            ("type", "route"),
        ],
    )
}

pub fn route_master(id: i64, ref_: &str, route_ids: Vec<i64>) -> Element {
    relation(
        id,
        route_ids
            .into_iter()
            .map(|r| (ElementKind::Relation, r, ""))
            .collect(),
        &[
            ("ref", ref_),
            ("route_master", "subway"),
            ("type", "route_master"),
        ],
    )
}

pub fn city_row(num_stations: i64, num_lines: i64, num_interchanges: i64) -> CityRow {
    CityRow {
        id: "1".to_string(),
        name: "Null Island".to_string(),
        country: "World".to_string(),
        continent: "Africa".to_string(),
        num_stations: num_stations.to_string(),
        num_lines: num_lines.to_string(),
        num_light_lines: "0".to_string(),
        num_interchanges: num_interchanges.to_string(),
        bbox: "-89,-179,89,179".to_string(),
        ..Default::default()
    }
}

/// Computes centers, sorts the elements into the city by bbox and runs the
/// whole validation sequence.
pub fn validate_city(elements: Vec<Element>, row: CityRow) -> City {
    validate_city_of_kind(elements, row, false)
}

pub fn validate_city_of_kind(mut elements: Vec<Element>, row: CityRow, overground: bool) -> City {
    calculate_centers(&mut elements);
    let mut cities = vec![City::new(row, overground)];
    for el in &elements {
        if cities[0].contains(el) {
            cities[0].add(el);
        }
    }
    validate_cities(&mut cities);
    cities.pop().unwrap()
}

/// The route variants of the only route master, looked up by name.
pub fn variant<'a>(city: &'a City, name: &str) -> &'a transit_model::Route {
    city.routes
        .values()
        .flat_map(|master| master.routes.iter())
        .find(|route| route.name.as_deref() == Some(name))
        .unwrap_or_else(|| panic!("no route variant named {}", name))
}
