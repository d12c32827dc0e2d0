use std::time::Duration;

use anyhow::{bail, Result};

use osm_reader::Element;
use transit_model::{Bbox, MODES_OVERGROUND, MODES_RAPID};

const SLICE_SIZE: usize = 10;
const INTERREQUEST_WAIT: Duration = Duration::from_secs(5);

/// One query covering several bboxes: route relations of every accepted
/// mode, their masters, entrance nodes (rapid transit only), stop areas and
/// stop area groups, with centers precomputed by Overpass.
fn compose_overpass_request(overground: bool, bboxes: &[Bbox]) -> Result<String> {
    if bboxes.is_empty() {
        bail!("No bboxes given for overpass request");
    }
    let mut modes: Vec<&str> = if overground {
        MODES_OVERGROUND.to_vec()
    } else {
        MODES_RAPID.to_vec()
    };
    modes.sort_unstable();
    let mut query = "[out:json][timeout:1000];(".to_string();
    for bbox in bboxes {
        let bbox_part = format!("({})", bbox.overpass_format());
        query.push('(');
        for mode in &modes {
            query.push_str(&format!("rel[route=\"{}\"]{};", mode, bbox_part));
        }
        query.push_str(");");
        query.push_str("rel(br)[type=route_master];");
        if !overground {
            query.push_str(&format!("node[railway=subway_entrance]{};", bbox_part));
            query.push_str(&format!("node[railway=train_station_entrance]{};", bbox_part));
        }
        query.push_str(&format!("rel[public_transport=stop_area]{};", bbox_part));
        query.push_str("rel(br)[type=public_transport][public_transport=stop_area_group];");
    }
    query.push_str(");(._;>>;);out body center qt;");
    debug!("Query: {}", query);
    Ok(query)
}

fn overpass_request(overground: bool, overpass_api: &str, bboxes: &[Bbox]) -> Result<Vec<Element>> {
    let query = compose_overpass_request(overground, bboxes)?;
    let response = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(1000))
        .build()?
        .get(overpass_api)
        .query(&[("data", &query)])
        .send()?;
    if !response.status().is_success() {
        bail!("Failed to query Overpass API: HTTP {}", response.status());
    }
    osm_reader::parse_overpass(&response.bytes()?)
}

/// Queries Overpass in slices of a few bboxes, pausing in between to be
/// polite to the public server.
pub fn multi_overpass(
    overground: bool,
    overpass_api: &str,
    bboxes: &[Bbox],
) -> Result<Vec<Element>> {
    let mut result = Vec::new();
    for (i, chunk) in bboxes.chunks(SLICE_SIZE).enumerate() {
        if i > 0 {
            std::thread::sleep(INTERREQUEST_WAIT);
        }
        result.extend(overpass_request(overground, overpass_api, chunk)?);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_overpass_request() {
        let bbox = Bbox::parse("55.5,37.3,56.0,38.0").unwrap();
        let query = compose_overpass_request(false, &[bbox]).unwrap();
        assert!(query.starts_with("[out:json]"));
        assert!(query.contains("rel[route=\"subway\"](55.5,37.3,56,38);"));
        assert!(query.contains("node[railway=subway_entrance]"));
        assert!(query.contains("rel(br)[type=route_master];"));
        assert!(query.ends_with(");(._;>>;);out body center qt;"));
        assert!(compose_overpass_request(false, &[]).is_err());

        // Overground: per-mode routes, no entrance nodes
        let query = compose_overpass_request(true, &[bbox]).unwrap();
        assert!(query.contains("rel[route=\"tram\"](55.5,37.3,56,38);"));
        assert!(query.contains("rel[route=\"trolleybus\"]"));
        assert!(!query.contains("subway_entrance"));
    }
}
