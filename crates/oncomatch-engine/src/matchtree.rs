//! Match tree construction.
//!
//! The `match:` clause of a treatment node nests `and` / `or` / `clinical`
//! / `genomic` mappings. It is parsed breadth-first into an immutable flat
//! tree (indices instead of pointers) so that child order reflects the
//! declared order and per-node evaluation results can live in a parallel
//! array.

use serde_json::Value;

use crate::criteria::{ClinicalCriteria, GenomicCriteria};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub enum NodeKind {
    And,
    Or,
    Clinical(ClinicalCriteria),
    Genomic(GenomicCriteria),
}

#[derive(Debug, Clone)]
pub struct MatchNode {
    pub kind: NodeKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct MatchTree {
    /// Node 0 is the root.
    pub nodes: Vec<MatchNode>,
}

impl MatchTree {
    /// Build from one match clause. Every clause must be a mapping with
    /// exactly one of the four recognized keys.
    pub fn build(clause: &Value) -> Result<Self> {
        let mut nodes: Vec<MatchNode> = Vec::new();
        // breadth-first queue of (parent, clause)
        let mut queue: Vec<(Option<usize>, &Value)> = vec![(None, clause)];
        let mut at = 0;
        while at < queue.len() {
            let (parent, value) = queue[at];
            at += 1;

            let map = value.as_object().ok_or_else(|| {
                EngineError::InvalidTrial(format!("match clause is not a mapping: {value}"))
            })?;
            if map.len() != 1 {
                return Err(EngineError::InvalidTrial(format!(
                    "match clause must have exactly one of and/or/clinical/genomic: {value}"
                )));
            }
            let (key, inner) = map.iter().next().expect("len checked above");

            let index = nodes.len();
            let kind = match key.to_lowercase().as_str() {
                "and" | "or" => {
                    let children = inner.as_array().ok_or_else(|| {
                        EngineError::InvalidTrial(format!("{key} clause must hold a list"))
                    })?;
                    if children.is_empty() {
                        return Err(EngineError::InvalidTrial(format!(
                            "{key} clause has no children"
                        )));
                    }
                    for child in children {
                        queue.push((Some(index), child));
                    }
                    if key.eq_ignore_ascii_case("and") {
                        NodeKind::And
                    } else {
                        NodeKind::Or
                    }
                }
                "clinical" => {
                    let inner = inner.as_object().ok_or_else(|| {
                        EngineError::InvalidTrial("clinical clause must hold a mapping".into())
                    })?;
                    NodeKind::Clinical(ClinicalCriteria::from_value(inner))
                }
                "genomic" => {
                    let inner = inner.as_object().ok_or_else(|| {
                        EngineError::InvalidTrial("genomic clause must hold a mapping".into())
                    })?;
                    NodeKind::Genomic(GenomicCriteria::from_value(inner))
                }
                other => {
                    return Err(EngineError::InvalidTrial(format!(
                        "unrecognized match clause key: {other}"
                    )));
                }
            };

            nodes.push(MatchNode {
                kind,
                parent,
                children: Vec::new(),
            });
            if let Some(p) = parent {
                nodes[p].children.push(index);
            }
        }

        Ok(Self { nodes })
    }

    pub fn is_leaf(&self, index: usize) -> bool {
        self.nodes[index].children.is_empty()
    }

    /// Children before parents; respects declared child order.
    pub fn postorder(&self) -> Vec<usize> {
        fn visit(tree: &MatchTree, index: usize, out: &mut Vec<usize>) {
            for &child in &tree.nodes[index].children {
                visit(tree, child, out);
            }
            out.push(index);
        }
        let mut out = Vec::with_capacity(self.nodes.len());
        if !self.nodes.is_empty() {
            visit(self, 0, &mut out);
        }
        out
    }

    /// Whether the subtree rooted at `index` contains a genomic leaf.
    pub fn subtree_has_genomic(&self, index: usize) -> bool {
        if matches!(self.nodes[index].kind, NodeKind::Genomic(_)) {
            return true;
        }
        self.nodes[index]
            .children
            .iter()
            .any(|&c| self.subtree_has_genomic(c))
    }

    /// Whether a clinical leaf has a genomic relative: walking toward the
    /// root, some boolean ancestor holds a genomic descendant in a
    /// sibling subtree. Leaves without one emit clinical-only records.
    pub fn has_genomic_relative(&self, leaf: usize) -> bool {
        let mut current = leaf;
        while let Some(parent) = self.nodes[current].parent {
            for &sibling in &self.nodes[parent].children {
                if sibling != current && self.subtree_has_genomic(sibling) {
                    return true;
                }
            }
            current = parent;
        }
        false
    }
}
