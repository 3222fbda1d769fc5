// Bolt Paths
// Resolves the wire form of a path (nodes, unbound relationships, indices) into directed segments

use boltr::types::{BoltNode, BoltPath, BoltRelationship, BoltUnboundRelationship};

/// Element id, falling back to the legacy numeric id when the server sent none.
pub fn element_id_or(element_id: &str, id: i64) -> String {
    if element_id.is_empty() {
        id.to_string()
    } else {
        element_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSegment {
    pub start: BoltNode,
    pub relationship: BoltRelationship,
    pub end: BoltNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub start: BoltNode,
    pub end: BoltNode,
    pub segments: Vec<ResolvedSegment>,
}

fn bind(rel: &BoltUnboundRelationship, start: &BoltNode, end: &BoltNode) -> BoltRelationship {
    BoltRelationship {
        id: rel.id,
        start_node_id: start.id,
        end_node_id: end.id,
        rel_type: rel.rel_type.clone(),
        properties: rel.properties.clone(),
        element_id: element_id_or(&rel.element_id, rel.id),
        start_element_id: element_id_or(&start.element_id, start.id),
        end_element_id: element_id_or(&end.element_id, end.id),
    }
}

impl ResolvedPath {
    /// `indices` alternates a 1-based relationship index (negative when the
    /// relationship is traversed against its direction) with a node index.
    pub fn resolve(path: &BoltPath) -> Result<Self, String> {
        let first = path.nodes.first().cloned().ok_or("path without nodes")?;
        if path.indices.len() % 2 != 0 {
            return Err("path indices must come in pairs".to_string());
        }

        let mut segments = Vec::with_capacity(path.indices.len() / 2);
        let mut previous = first.clone();
        for pair in path.indices.chunks(2) {
            let (rel_index, node_index) = (pair[0], pair[1]);
            let next = usize::try_from(node_index)
                .ok()
                .and_then(|i| path.nodes.get(i))
                .cloned()
                .ok_or_else(|| format!("path node index {} out of range", node_index))?;
            let unbound = usize::try_from(rel_index.unsigned_abs())
                .ok()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| path.rels.get(i))
                .ok_or_else(|| format!("path relationship index {} out of range", rel_index))?;
            let relationship = if rel_index > 0 {
                bind(unbound, &previous, &next)
            } else {
                bind(unbound, &next, &previous)
            };
            segments.push(ResolvedSegment {
                start: previous.clone(),
                relationship,
                end: next.clone(),
            });
            previous = next;
        }

        Ok(Self {
            start: first,
            end: previous,
            segments,
        })
    }
}
