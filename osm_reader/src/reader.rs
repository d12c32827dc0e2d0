use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use geom::LonLat;

use crate::{Element, ElementData, ElementId, ElementKind, Member, Tags};

/// The shape elements take in Overpass API responses and in our JSON source
/// cache. Missing objects are not resolved here; the pipeline tolerates
/// references pointing outside the extract.
#[derive(Serialize, Deserialize)]
struct RawElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nodes: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    members: Option<Vec<RawMember>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    center: Option<RawCenter>,
}

#[derive(Serialize, Deserialize)]
struct RawMember {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "ref")]
    id: i64,
    #[serde(default)]
    role: String,
}

#[derive(Serialize, Deserialize)]
struct RawCenter {
    lon: f64,
    lat: f64,
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<RawElement>,
}

fn raw_to_element(raw: RawElement) -> Result<Element> {
    let kind = ElementKind::parse(&raw.kind)
        .ok_or_else(|| anyhow!("unknown element type {}", raw.kind))?;
    let id = ElementId { kind, id: raw.id };
    let tags = Tags::from(raw.tags.unwrap_or_default());
    let center = raw.center.map(|c| LonLat::new(c.lon, c.lat));
    let data = match kind {
        ElementKind::Node => ElementData::Node {
            pt: LonLat::new(
                raw.lon.ok_or_else(|| anyhow!("node {} without lon", id))?,
                raw.lat.ok_or_else(|| anyhow!("node {} without lat", id))?,
            ),
        },
        ElementKind::Way => ElementData::Way {
            nodes: raw.nodes.unwrap_or_default(),
        },
        ElementKind::Relation => ElementData::Relation {
            members: raw
                .members
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| {
                    ElementKind::parse(&m.kind).map(|kind| Member {
                        kind,
                        id: m.id,
                        role: m.role,
                    })
                })
                .collect(),
        },
    };
    Ok(Element {
        id,
        tags,
        center,
        data,
    })
}

fn element_to_raw(el: &Element) -> RawElement {
    RawElement {
        kind: el.id.kind.name().to_string(),
        id: el.id.id,
        lon: match el.data {
            ElementData::Node { pt } => Some(pt.lon),
            _ => None,
        },
        lat: match el.data {
            ElementData::Node { pt } => Some(pt.lat),
            _ => None,
        },
        tags: if el.tags.is_empty() {
            None
        } else {
            Some(el.tags.inner().clone())
        },
        nodes: match &el.data {
            ElementData::Way { nodes } => Some(nodes.clone()),
            _ => None,
        },
        members: match &el.data {
            ElementData::Relation { members } => Some(
                members
                    .iter()
                    .map(|m| RawMember {
                        kind: m.kind.name().to_string(),
                        id: m.id,
                        role: m.role.clone(),
                    })
                    .collect(),
            ),
            _ => None,
        },
        center: el.center.map(|c| RawCenter {
            lon: c.lon,
            lat: c.lat,
        }),
    }
}

/// Reads elements from a JSON file: either a raw Overpass response with an
/// `elements` array, or a plain array written by `write_json`.
pub fn read_json(path: &str) -> Result<Vec<Element>> {
    let bytes = fs_err::read(path)?;
    let raw: Vec<RawElement> = match serde_json::from_slice::<OverpassResponse>(&bytes) {
        Ok(response) => response.elements,
        Err(_) => serde_json::from_slice(&bytes)?,
    };
    let elements = raw
        .into_iter()
        .map(raw_to_element)
        .collect::<Result<Vec<_>>>()?;
    info!("Read {} elements from {}", elements.len(), path);
    Ok(elements)
}

/// Parses raw Overpass response bytes.
pub fn parse_overpass(bytes: &[u8]) -> Result<Vec<Element>> {
    let response: OverpassResponse = serde_json::from_slice(bytes)?;
    response.elements.into_iter().map(raw_to_element).collect()
}

/// Writes elements back out as a plain JSON array, the source-cache format.
pub fn write_json(path: &str, elements: &[Element]) -> Result<()> {
    let raw: Vec<RawElement> = elements.iter().map(element_to_raw).collect();
    fs_err::write(path, serde_json::to_vec(&raw)?)?;
    Ok(())
}

/// Reads an OSM XML extract. References to missing objects are kept as-is;
/// downstream passes decide what a dangling reference means.
pub fn read_xml(path: &str) -> Result<Vec<Element>> {
    let bytes = fs_err::read(path)?;
    let raw_string = std::str::from_utf8(&bytes)?;
    let tree = roxmltree::Document::parse(raw_string)?;

    let mut elements = Vec::new();
    for obj in tree.descendants() {
        if !obj.is_element() {
            continue;
        }
        let kind = match ElementKind::parse(obj.tag_name().name()) {
            Some(kind) => kind,
            None => continue,
        };
        let id = ElementId {
            kind,
            id: parse_attribute(obj, "id")?,
        };
        let tags = read_tags(obj);
        let data = match kind {
            ElementKind::Node => ElementData::Node {
                pt: LonLat::new(parse_attribute(obj, "lon")?, parse_attribute(obj, "lat")?),
            },
            ElementKind::Way => {
                let mut nodes = Vec::new();
                for child in obj.children() {
                    if child.tag_name().name() == "nd" {
                        nodes.push(parse_attribute(child, "ref")?);
                    }
                }
                ElementData::Way { nodes }
            }
            ElementKind::Relation => {
                let mut members = Vec::new();
                for child in obj.children() {
                    if child.tag_name().name() == "member" {
                        let member_kind = child
                            .attribute("type")
                            .and_then(ElementKind::parse);
                        if let Some(member_kind) = member_kind {
                            members.push(Member {
                                kind: member_kind,
                                id: parse_attribute(child, "ref")?,
                                role: child.attribute("role").unwrap_or("").to_string(),
                            });
                        }
                    }
                }
                ElementData::Relation { members }
            }
        };
        elements.push(Element {
            id,
            tags,
            center: None,
            data,
        });
    }
    info!("Read {} elements from {}", elements.len(), path);
    Ok(elements)
}

fn parse_attribute<T: std::str::FromStr>(node: roxmltree::Node, key: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(node
        .attribute(key)
        .ok_or_else(|| anyhow!("<{}> missing attribute {}", node.tag_name().name(), key))?
        .parse::<T>()?)
}

fn read_tags(obj: roxmltree::Node) -> Tags {
    let mut tags = Tags::new();
    for child in obj.children() {
        if child.tag_name().name() == "tag" {
            if let (Some(k), Some(v)) = (child.attribute("k"), child.attribute("v")) {
                tags.insert(k, v);
            }
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_xml_extract() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
  <node id="1" lat="55.0" lon="37.0">
    <tag k="railway" v="station"/>
    <tag k="station" v="subway"/>
    <tag k="name" v="First"/>
  </node>
  <node id="2" lat="55.001" lon="37.001"/>
  <way id="10">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="railway" v="subway"/>
  </way>
  <relation id="100">
    <member type="node" ref="1" role="stop"/>
    <member type="way" ref="10" role=""/>
    <tag k="type" v="route"/>
    <tag k="route" v="subway"/>
  </relation>
</osm>"#;
        let path = std::env::temp_dir().join("osm_reader_test_extract.osm");
        fs_err::write(&path, xml).unwrap();
        let elements = read_xml(path.to_str().unwrap()).unwrap();
        assert_eq!(elements.len(), 4);

        assert_eq!(elements[0].id, ElementId::node(1));
        assert_eq!(elements[0].center(), Some(geom::LonLat::new(37.0, 55.0)));
        assert!(elements[0].tags.is("railway", "station"));

        assert_eq!(elements[2].id, ElementId::way(10));
        assert_eq!(elements[2].nodes(), &[1, 2]);

        assert_eq!(elements[3].id, ElementId::relation(100));
        let members = elements[3].members();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].element_id(), ElementId::node(1));
        assert_eq!(members[0].role, "stop");
        assert_eq!(members[1].element_id(), ElementId::way(10));

        // Round-trip through the JSON cache format
        let json_path = std::env::temp_dir().join("osm_reader_test_extract.json");
        write_json(json_path.to_str().unwrap(), &elements).unwrap();
        let reread = read_json(json_path.to_str().unwrap()).unwrap();
        assert_eq!(elements, reread);
    }

    #[test]
    fn test_read_overpass_response() {
        let json = r#"{
  "version": 0.6,
  "elements": [
    {"type": "node", "id": 1, "lat": 55.0, "lon": 37.0},
    {"type": "way", "id": 10, "nodes": [1], "center": {"lat": 55.0, "lon": 37.0},
     "tags": {"railway": "platform"}},
    {"type": "relation", "id": 100,
     "members": [{"type": "way", "ref": 10, "role": "platform"}],
     "tags": {"public_transport": "stop_area", "type": "public_transport"}}
  ]
}"#;
        let path = std::env::temp_dir().join("osm_reader_test_overpass.json");
        fs_err::write(&path, json).unwrap();
        let elements = read_json(path.to_str().unwrap()).unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[1].center(), Some(geom::LonLat::new(37.0, 55.0)));
        assert_eq!(elements[2].members()[0].role, "platform");
    }
}
