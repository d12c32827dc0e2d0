//! An untyped model of OSM elements -- nodes, ways, relations with arbitrary
//! tags -- plus readers for the two sources we support (Overpass-style JSON
//! and OSM XML) and the center-calculation pass. The transit model downstream
//! interprets these elements; this crate just gets them into memory.

#[macro_use]
extern crate log;

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use geom::LonLat;

mod centers;
mod reader;
mod tags;

pub use crate::centers::calculate_centers;
pub use crate::reader::{parse_overpass, read_json, read_xml, write_json};
pub use crate::tags::Tags;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    pub fn letter(self) -> char {
        match self {
            ElementKind::Node => 'n',
            ElementKind::Way => 'w',
            ElementKind::Relation => 'r',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }

    pub fn parse(name: &str) -> Option<ElementKind> {
        match name {
            "node" => Some(ElementKind::Node),
            "way" => Some(ElementKind::Way),
            "relation" => Some(ElementKind::Relation),
            _ => None,
        }
    }
}

/// A stable identifier for an OSM element, rendered as `n123`, `w456`,
/// `r789`. Cheap to copy and to order; relations among entities are always
/// expressed through these rather than through object references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId {
    pub kind: ElementKind,
    pub id: i64,
}

impl ElementId {
    pub fn node(id: i64) -> ElementId {
        ElementId {
            kind: ElementKind::Node,
            id,
        }
    }

    pub fn way(id: i64) -> ElementId {
        ElementId {
            kind: ElementKind::Way,
            id,
        }
    }

    pub fn relation(id: i64) -> ElementId {
        ElementId {
            kind: ElementKind::Relation,
            id,
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.kind.letter(), self.id)
    }
}

impl FromStr for ElementId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<ElementId> {
        let kind = match s.chars().next() {
            Some('n') => ElementKind::Node,
            Some('w') => ElementKind::Way,
            Some('r') => ElementKind::Relation,
            _ => return Err(anyhow!("bad element id {}", s)),
        };
        let id = s[1..].parse::<i64>()?;
        Ok(ElementId { kind, id })
    }
}

impl Serialize for ElementId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<ElementId, D::Error> {
        let s = <String>::deserialize(deserializer)?;
        ElementId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// One member of a relation: what it points to and in which role.
#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    pub kind: ElementKind,
    pub id: i64,
    pub role: String,
}

impl Member {
    pub fn element_id(&self) -> ElementId {
        ElementId {
            kind: self.kind,
            id: self.id,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementData {
    Node { pt: LonLat },
    Way { nodes: Vec<i64> },
    Relation { members: Vec<Member> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub tags: Tags,
    /// For ways and relations, filled by `calculate_centers` (or already
    /// present in an Overpass response queried with `out center`).
    pub center: Option<LonLat>,
    pub data: ElementData,
}

impl Element {
    /// The element's representative point: a node's own position, or the
    /// cached center for ways and relations.
    pub fn center(&self) -> Option<LonLat> {
        match self.data {
            ElementData::Node { pt } => Some(pt),
            _ => self.center,
        }
    }

    pub fn members(&self) -> &[Member] {
        match &self.data {
            ElementData::Relation { members } => members,
            _ => &[],
        }
    }

    pub fn nodes(&self) -> &[i64] {
        match &self.data {
            ElementData::Way { nodes } => nodes,
            _ => &[],
        }
    }

    /// The network a route belongs to, by decreasing specificity of tags.
    pub fn network(&self) -> Option<&String> {
        for key in ["network:metro", "network", "operator"] {
            if let Some(value) = self.tags.get(key) {
                return Some(value);
            }
        }
        None
    }
}
