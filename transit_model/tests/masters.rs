//! Route master aggregation: twin-route diffing, return-direction checks,
//! tag reconciliation between master and variants.

use osm_reader::ElementKind;

mod common;
use common::*;

#[test]
fn test_twin_route_with_a_missing_stop() {
    let elements = vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 0.001, 0.0, "Station 2"),
        station(3, 0.002, 0.0, "Station 3"),
        station(4, 0.003, 0.0, "Station 4"),
        rail(1, vec![1, 2, 3, 4]),
        route(
            1,
            "1",
            "Forward",
            vec![
                (ElementKind::Node, 1, ""),
                (ElementKind::Node, 2, ""),
                (ElementKind::Node, 3, ""),
                (ElementKind::Node, 4, ""),
                (ElementKind::Way, 1, ""),
            ],
        ),
        // The return direction misses Station 2, although it lies on the
        // same tracks
        route(
            2,
            "1",
            "Backward",
            vec![
                (ElementKind::Node, 4, ""),
                (ElementKind::Node, 3, ""),
                (ElementKind::Node, 1, ""),
                (ElementKind::Way, 1, ""),
            ],
        ),
        route_master(3, "1", vec![1, 2]),
    ];
    let city = validate_city(elements, city_row(4, 1, 0));
    assert!(city.is_good(), "errors: {:?}", city.log.errors());
    assert!(
        city.log
            .notices()
            .iter()
            .any(|n| n.contains("Stop Station 2")
                && n.contains("is included in the r1 but not included in r2")),
        "{:?}",
        city.log.notices()
    );
}

#[test]
fn test_missing_return_direction() {
    let elements = vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 0.001, 0.0, "Station 2"),
        station(3, 0.002, 0.0, "Station 3"),
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
        route_master(2, "1", vec![1]),
    ];
    let city = validate_city(elements, city_row(3, 1, 0));
    // A single non-circular variant is an error
    assert!(!city.is_good());
    assert!(city
        .log
        .errors()
        .iter()
        .any(|e| e.contains("Only one route in route_master")));
}

#[test]
fn test_master_reconciles_tags() {
    let mut master = route_master(10, "7", vec![1, 2]);
    master.tags.insert("colour", "red");
    master.tags.insert("name", "Line 7");

    let mut fwd = route(
        1,
        "7",
        "Forward",
        vec![(ElementKind::Node, 1, ""), (ElementKind::Node, 2, "")],
    );
    fwd.tags.insert("interval", "5");
    let mut bwd = route(
        2,
        "7",
        "Backward",
        vec![(ElementKind::Node, 2, ""), (ElementKind::Node, 1, "")],
    );
    bwd.tags.insert("interval", "00:04:00");
    // Disagrees with the master's colour
    bwd.tags.insert("colour", "blue");

    let elements = vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 0.001, 0.0, "Station 2"),
        fwd,
        bwd,
        master,
    ];
    let city = validate_city(elements, city_row(2, 1, 0));
    assert!(city.is_good(), "errors: {:?}", city.log.errors());

    let rm = city.routes.values().next().unwrap();
    assert_eq!(rm.ref_.as_deref(), Some("7"));
    assert_eq!(rm.name.as_deref(), Some("Line 7"));
    assert_eq!(rm.colour.as_deref(), Some("#ff0000"));
    // Minimum of the variants' intervals
    assert_eq!(rm.interval, Some(240));
    // Routes without own colour inherit the master's
    assert_eq!(variant(&city, "Forward").colour.as_deref(), Some("#ff0000"));
    assert_eq!(variant(&city, "Backward").colour.as_deref(), Some("#0000ff"));
    assert!(city
        .log
        .notices()
        .iter()
        .any(|n| n.contains("has different colour from master")));

    // Longest variant wins the best slot; both have 2 stops, so the
    // smallest id does
    assert_eq!(rm.best, Some(0));
}

#[test]
fn test_mode_mismatch_rejects_route() {
    let mut tram = route(
        2,
        "1",
        "Oddball",
        vec![(ElementKind::Node, 2, ""), (ElementKind::Node, 1, "")],
    );
    tram.tags.insert("route", "light_rail");

    let elements = vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 0.001, 0.0, "Station 2"),
        route(
            1,
            "1",
            "Forward",
            vec![(ElementKind::Node, 1, ""), (ElementKind::Node, 2, "")],
        ),
        tram,
        route_master(3, "1", vec![1, 2]),
    ];
    let city = validate_city(elements, city_row(2, 1, 0));
    assert!(!city.is_good());
    assert!(city
        .log
        .errors()
        .iter()
        .any(|e| e.contains("Incompatible PT mode")));
    let rm = city.routes.values().next().unwrap();
    assert_eq!(rm.routes.len(), 1);
}

#[test]
fn test_circular_routes_with_return() {
    let mut elements = vec![
        station(1, 0.0, 0.0, "Station 1"),
        station(2, 0.001, 0.0, "Station 2"),
        station(3, 0.001, 0.001, "Station 3"),
        station(4, 0.0, 0.001, "Station 4"),
    ];
    let loop_members = |ids: Vec<i64>| -> Vec<(ElementKind, i64, &'static str)> {
        ids.into_iter().map(|i| (ElementKind::Node, i, "")).collect()
    };
    elements.push(route(1, "1", "Clockwise", loop_members(vec![1, 2, 3, 4, 1])));
    elements.push(route(
        2,
        "1",
        "Counterclockwise",
        loop_members(vec![1, 4, 3, 2, 1]),
    ));
    elements.push(route_master(3, "1", vec![1, 2]));

    let city = validate_city(elements, city_row(4, 1, 0));
    assert!(city.is_good(), "errors: {:?}", city.log.errors());
    // The two loops run in opposite directions, so neither lacks a return
    assert!(
        !city
            .log
            .notices()
            .iter()
            .any(|n| n.contains("Route does not have a return direction")),
        "{:?}",
        city.log.notices()
    );
}
