//! Track building, stop projection and stop order checks on small synthetic
//! networks.

use geom::LonLat;
use osm_reader::ElementKind;

mod common;
use common::*;

fn two_station_elements(with_rails: bool) -> Vec<osm_reader::Element> {
    let mut elements = vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 1.0, 0.0, "Station 2"),
    ];
    let mut fwd = vec![
        (ElementKind::Node, 1, ""),
        (ElementKind::Node, 2, ""),
    ];
    let mut bwd = vec![
        (ElementKind::Node, 2, ""),
        (ElementKind::Node, 1, ""),
    ];
    if with_rails {
        elements.push(rail(1, vec![1, 2]));
        fwd.push((ElementKind::Way, 1, ""));
        bwd.push((ElementKind::Way, 1, ""));
    }
    elements.push(route(1, "1", "Forward", fwd));
    elements.push(route(2, "1", "Backward", bwd));
    elements.push(route_master(3, "1", vec![1, 2]));
    elements
}

#[test]
fn test_two_stations_no_rails() {
    let city = validate_city(two_station_elements(false), city_row(2, 1, 0));
    assert!(city.is_good(), "errors: {:?}", city.log.errors());
    assert_eq!(city.found_stations, 2);

    let fwd = variant(&city, "Forward");
    assert!(fwd.tracks.is_empty());
    assert_eq!(fwd.first_stop_on_rails_index, 2);
    assert_eq!(fwd.last_stop_on_rails_index, 1);
    assert!(fwd.stops.iter().all(|s| s.positions_on_rails.is_empty()));

    assert_eq!(
        fwd.get_extended_tracks(),
        vec![LonLat::new(0.0, 0.0), LonLat::new(1.0, 0.0)]
    );
    assert!(fwd.get_truncated_tracks(&fwd.tracks).is_empty());

    let bwd = variant(&city, "Backward");
    assert_eq!(
        bwd.get_extended_tracks(),
        vec![LonLat::new(1.0, 0.0), LonLat::new(0.0, 0.0)]
    );
}

#[test]
fn test_two_stations_connected_with_rails() {
    let city = validate_city(two_station_elements(true), city_row(2, 1, 0));
    assert!(city.is_good(), "errors: {:?}", city.log.errors());
    // The backward variant reuses the forward way, so its tracks get
    // flipped; nothing else deserves a warning.
    assert!(
        city.log
            .warnings()
            .iter()
            .all(|w| w.contains("Tracks seem to go in the opposite direction")),
        "{:?}",
        city.log.warnings()
    );

    let fwd = variant(&city, "Forward");
    assert_eq!(
        fwd.tracks,
        vec![LonLat::new(0.0, 0.0), LonLat::new(1.0, 0.0)]
    );
    assert_eq!(fwd.first_stop_on_rails_index, 0);
    assert_eq!(fwd.last_stop_on_rails_index, 1);
    assert_eq!(fwd.stops[0].positions_on_rails, vec![0.0]);
    assert_eq!(fwd.stops[1].positions_on_rails, vec![1.0]);
    assert_eq!(fwd.get_truncated_tracks(&fwd.tracks), fwd.tracks);

    // Distance of one degree of longitude at the equator, equirectangular
    assert_eq!(fwd.stops[0].distance, 0);
    assert_eq!(fwd.stops[1].distance, 111_319);

    let bwd = variant(&city, "Backward");
    assert_eq!(
        bwd.tracks,
        vec![LonLat::new(1.0, 0.0), LonLat::new(0.0, 0.0)]
    );
}

fn four_stations_on_a_line() -> Vec<osm_reader::Element> {
    vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 0.001, 0.0, "Station 2"),
        station(3, 0.002, 0.0, "Station 3"),
        station(4, 0.003, 0.0, "Station 4"),
        rail(1, vec![1, 2, 3, 4]),
    ]
}

#[test]
fn test_unordered_stops_on_tracks() {
    let mut elements = four_stations_on_a_line();
    elements.push(route(
        1,
        "1",
        "Forward",
        vec![
            (ElementKind::Node, 1, ""),
            (ElementKind::Node, 3, ""),
            (ElementKind::Node, 2, ""),
            (ElementKind::Node, 4, ""),
            (ElementKind::Way, 1, ""),
        ],
    ));
    elements.push(route(
        2,
        "1",
        "Backward",
        vec![
            (ElementKind::Node, 4, ""),
            (ElementKind::Node, 2, ""),
            (ElementKind::Node, 3, ""),
            (ElementKind::Node, 1, ""),
            (ElementKind::Way, 1, ""),
        ],
    ));
    elements.push(route_master(3, "1", vec![1, 2]));

    let city = validate_city(elements, city_row(4, 1, 0));
    assert!(!city.is_good());
    let errors = city.log.errors();
    assert_eq!(
        errors
            .iter()
            .filter(|e| e.contains("Stops on tracks are unordered near \"Station 2\""))
            .count(),
        2,
        "{:?}",
        errors
    );
}

#[test]
fn test_backward_tracks_get_reversed() {
    // Stops in forward order, but the route refers to tracks laid the other
    // way: not an error, just a warning and a track flip.
    let mut elements = vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 0.001, 0.0, "Station 2"),
        station(3, 0.002, 0.0, "Station 3"),
        rail(1, vec![3, 2, 1]),
    ];
    elements.push(route(
        1,
        "1",
        "Forward",
        vec![
            (ElementKind::Node, 1, ""),
            (ElementKind::Node, 2, ""),
            (ElementKind::Node, 3, ""),
            (ElementKind::Way, 1, ""),
        ],
    ));
    elements.push(route(
        2,
        "1",
        "Backward",
        vec![
            (ElementKind::Node, 3, ""),
            (ElementKind::Node, 2, ""),
            (ElementKind::Node, 1, ""),
            (ElementKind::Way, 1, ""),
        ],
    ));
    elements.push(route_master(3, "1", vec![1, 2]));

    let city = validate_city(elements, city_row(3, 1, 0));
    assert!(city.is_good(), "errors: {:?}", city.log.errors());
    let fwd = variant(&city, "Forward");
    assert_eq!(fwd.tracks[0], LonLat::new(0.0, 0.0));
    assert!(city
        .log
        .warnings()
        .iter()
        .any(|w| w.contains("Tracks seem to go in the opposite direction to stops")));
}

fn angle_elements(middle_lat_offset: f64) -> Vec<osm_reader::Element> {
    // Station 3 doubles back towards Station 1; the offset controls how
    // narrow the angle at Station 2 is.
    vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 0.01, 0.0, "Station 2"),
        station(3, 0.0, middle_lat_offset, "Station 3"),
        route(
            1,
            "1",
            "Forward",
            vec![
                (ElementKind::Node, 1, ""),
                (ElementKind::Node, 2, ""),
                (ElementKind::Node, 3, ""),
            ],
        ),
        route(
            2,
            "1",
            "Backward",
            vec![
                (ElementKind::Node, 3, ""),
                (ElementKind::Node, 2, ""),
                (ElementKind::Node, 1, ""),
            ],
        ),
        route_master(3, "1", vec![1, 2]),
    ]
}

#[test]
fn test_sharp_angle_is_an_error() {
    let city = validate_city(angle_elements(0.002), city_row(3, 1, 0));
    assert!(!city.is_good());
    let errors = city.log.errors();
    assert_eq!(
        errors
            .iter()
            .filter(|e| e
                .contains("Angle between stops around \"Station 2\" (0.01, 0) is too narrow, 11"))
            .count(),
        2,
        "{:?}",
        errors
    );
}

#[test]
fn test_moderate_angle_is_a_notice() {
    let city = validate_city(angle_elements(0.005), city_row(3, 1, 0));
    assert!(city.is_good(), "errors: {:?}", city.log.errors());
    let notices = city.log.notices();
    assert_eq!(
        notices
            .iter()
            .filter(|n| n
                .contains("Angle between stops around \"Station 2\" (0.01, 0) is too narrow, 27"))
            .count(),
        2,
        "{:?}",
        notices
    );
}

#[test]
fn test_circular_route_on_closed_rails() {
    let elements = vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 0.001, 0.0, "Station 2"),
        station(3, 0.001, 0.001, "Station 3"),
        station(4, 0.0, 0.001, "Station 4"),
        rail(1, vec![1, 2, 3, 4, 1]),
        route(
            1,
            "1",
            "Loop",
            vec![
                (ElementKind::Node, 1, ""),
                (ElementKind::Node, 2, ""),
                (ElementKind::Node, 3, ""),
                (ElementKind::Node, 4, ""),
                (ElementKind::Node, 1, ""),
                (ElementKind::Way, 1, ""),
            ],
        ),
        route_master(2, "1", vec![1]),
    ];
    let city = validate_city(elements, city_row(4, 1, 0));
    assert!(city.is_good(), "errors: {:?}", city.log.errors());

    let route = variant(&city, "Loop");
    assert!(route.is_circular);
    assert_eq!(route.stops.len(), 5);
    assert_eq!(route.first_stop_on_rails_index, 0);
    assert_eq!(route.last_stop_on_rails_index, 4);
    assert_eq!(route.stops[0].positions_on_rails, vec![0.0, 4.0]);
    assert_eq!(route.stops[4].positions_on_rails, vec![0.0, 4.0]);

    // A lone circular variant only deserves a notice, not an error
    assert!(city
        .log
        .notices()
        .iter()
        .any(|n| n.contains("Please check if it needs a return route")));
}
