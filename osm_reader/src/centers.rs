use std::collections::HashMap;

use geom::LonLat;

use crate::{Element, ElementData, ElementKind};

/// Assigns a center to every way and relation that has one, caching it on
/// the element. Relations may reference each other cyclically and may refer
/// to objects outside the extract, so this runs a fixed-point loop over the
/// deferred relations rather than a recursive traversal: strict passes until
/// no progress, then one pass that skips unlocalized child relations, then
/// strict again. Whatever still has no center after that keeps none.
///
/// Relies on the nodes-ways-relations order of the input.
pub fn calculate_centers(elements: &mut [Element]) {
    let mut nodes: HashMap<i64, LonLat> = HashMap::new();
    let mut ways: HashMap<i64, LonLat> = HashMap::new();
    let mut relations: HashMap<i64, LonLat> = HashMap::new();

    let mut unlocalized_relations: Vec<usize> = Vec::new();

    for (idx, el) in elements.iter_mut().enumerate() {
        match &el.data {
            ElementData::Node { pt } => {
                nodes.insert(el.id.id, *pt);
            }
            ElementData::Way { .. } => {
                if let Some(center) = way_center(el, &nodes) {
                    el.center = Some(center);
                    ways.insert(el.id.id, center);
                }
            }
            ElementData::Relation { .. } => {
                if let Some(center) = relation_center(el, &nodes, &ways, &relations, false) {
                    el.center = Some(center);
                    relations.insert(el.id.id, center);
                } else {
                    unlocalized_relations.push(idx);
                }
            }
        }
    }

    while !unlocalized_relations.is_empty() {
        let remaining = relation_centers_pass(
            elements,
            &unlocalized_relations,
            &nodes,
            &ways,
            &mut relations,
            false,
        );
        if remaining.len() == unlocalized_relations.len() {
            let remaining = relation_centers_pass(
                elements,
                &unlocalized_relations,
                &nodes,
                &ways,
                &mut relations,
                true,
            );
            if remaining.len() == unlocalized_relations.len() {
                break;
            }
            unlocalized_relations = remaining;
        } else {
            unlocalized_relations = remaining;
        }
    }
}

fn relation_centers_pass(
    elements: &mut [Element],
    pending: &[usize],
    nodes: &HashMap<i64, LonLat>,
    ways: &HashMap<i64, LonLat>,
    relations: &mut HashMap<i64, LonLat>,
    ignore_unlocalized_child_relations: bool,
) -> Vec<usize> {
    let mut still_pending = Vec::new();
    for &idx in pending {
        if let Some(center) = relation_center(
            &elements[idx],
            nodes,
            ways,
            relations,
            ignore_unlocalized_child_relations,
        ) {
            elements[idx].center = Some(center);
            relations.insert(elements[idx].id.id, center);
        } else {
            still_pending.push(idx);
        }
    }
    still_pending
}

fn way_center(el: &Element, nodes: &HashMap<i64, LonLat>) -> Option<LonLat> {
    // An Overpass response queried with `out center` already has one
    if let Some(center) = el.center {
        return Some(center);
    }
    let way_nodes = el.nodes();
    let mut sum = (0.0, 0.0);
    let mut count = 0;
    for (i, nd) in way_nodes.iter().enumerate() {
        // Don't count the first node of a closed way twice
        if i == way_nodes.len() - 1 && way_nodes.len() > 1 && way_nodes[0] == way_nodes[i] {
            break;
        }
        if let Some(pt) = nodes.get(nd) {
            sum.0 += pt.lon;
            sum.1 += pt.lat;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(LonLat::new(sum.0 / count as f64, sum.1 / count as f64))
}

fn relation_center(
    el: &Element,
    nodes: &HashMap<i64, LonLat>,
    ways: &HashMap<i64, LonLat>,
    relations: &HashMap<i64, LonLat>,
    ignore_unlocalized_child_relations: bool,
) -> Option<LonLat> {
    if let Some(center) = el.center {
        return Some(center);
    }
    let mut sum = (0.0, 0.0);
    let mut count = 0;
    for m in el.members() {
        if m.kind == ElementKind::Relation && !relations.contains_key(&m.id) {
            if ignore_unlocalized_child_relations {
                continue;
            }
            // Cannot calculate a fair center while a child relation's own
            // center is unknown
            return None;
        }
        let container = match m.kind {
            ElementKind::Node => nodes,
            ElementKind::Way => ways,
            ElementKind::Relation => relations,
        };
        if let Some(pt) = container.get(&m.id) {
            sum.0 += pt.lon;
            sum.1 += pt.lat;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(LonLat::new(sum.0 / count as f64, sum.1 / count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementId, Member, Tags};

    fn node(id: i64, lon: f64, lat: f64) -> Element {
        Element {
            id: ElementId::node(id),
            tags: Tags::new(),
            center: None,
            data: ElementData::Node {
                pt: LonLat::new(lon, lat),
            },
        }
    }

    fn way(id: i64, nodes: Vec<i64>) -> Element {
        Element {
            id: ElementId::way(id),
            tags: Tags::new(),
            center: None,
            data: ElementData::Way { nodes },
        }
    }

    fn relation(id: i64, members: Vec<(ElementKind, i64)>) -> Element {
        Element {
            id: ElementId::relation(id),
            tags: Tags::new(),
            center: None,
            data: ElementData::Relation {
                members: members
                    .into_iter()
                    .map(|(kind, id)| Member {
                        kind,
                        id,
                        role: String::new(),
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn test_way_centers() {
        let mut elements = vec![
            node(1, 0.0, 0.0),
            node(2, 2.0, 0.0),
            node(3, 2.0, 2.0),
            node(4, 0.0, 2.0),
            // Open way
            way(10, vec![1, 2]),
            // Closed way: the repeated first node must not be counted twice
            way(11, vec![1, 2, 3, 4, 1]),
            // Way with an unresolved reference
            way(12, vec![1, 999]),
            // Fully unresolved way
            way(13, vec![998, 999]),
        ];
        calculate_centers(&mut elements);
        assert_eq!(elements[4].center, Some(LonLat::new(1.0, 0.0)));
        assert_eq!(elements[5].center, Some(LonLat::new(1.0, 1.0)));
        assert_eq!(elements[6].center, Some(LonLat::new(0.0, 0.0)));
        assert_eq!(elements[7].center, None);
    }

    #[test]
    fn test_relation_of_relations_out_of_order() {
        // r30 comes before its child r31 in the input, so the first pass
        // defers it and the fixed point picks it up later.
        let mut elements = vec![
            node(1, 0.0, 0.0),
            node(2, 2.0, 2.0),
            relation(30, vec![(ElementKind::Relation, 31)]),
            relation(
                31,
                vec![(ElementKind::Node, 1), (ElementKind::Node, 2)],
            ),
        ];
        calculate_centers(&mut elements);
        assert_eq!(elements[3].center, Some(LonLat::new(1.0, 1.0)));
        assert_eq!(elements[2].center, Some(LonLat::new(1.0, 1.0)));
    }

    #[test]
    fn test_cyclic_relations_with_localized_member() {
        // Two relations referencing each other; one has a node member, so the
        // tolerant pass can localize it and then the strict pass finishes.
        let mut elements = vec![
            node(1, 4.0, 6.0),
            relation(
                40,
                vec![(ElementKind::Relation, 41), (ElementKind::Node, 1)],
            ),
            relation(41, vec![(ElementKind::Relation, 40)]),
        ];
        calculate_centers(&mut elements);
        assert_eq!(elements[1].center, Some(LonLat::new(4.0, 6.0)));
        assert_eq!(elements[2].center, Some(LonLat::new(4.0, 6.0)));
    }

    #[test]
    fn test_cyclic_relations_without_members_stay_centerless() {
        let mut elements = vec![
            relation(50, vec![(ElementKind::Relation, 51)]),
            relation(51, vec![(ElementKind::Relation, 50)]),
        ];
        calculate_centers(&mut elements);
        assert_eq!(elements[0].center, None);
        assert_eq!(elements[1].center, None);
    }

    #[test]
    fn test_idempotent() {
        let mut elements = vec![
            node(1, 0.0, 0.0),
            node(2, 2.0, 0.0),
            way(10, vec![1, 2]),
            relation(30, vec![(ElementKind::Way, 10)]),
        ];
        calculate_centers(&mut elements);
        let first = elements.clone();
        calculate_centers(&mut elements);
        assert_eq!(first, elements);
    }
}
