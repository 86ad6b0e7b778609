//! Tumor taxonomy loading and diagnosis expansion.
//!
//! A trial names one diagnosis; matching needs the diagnosis plus every
//! descendant tumor type. Two source formats are accepted: a tab-separated
//! `name<TAB>parent` file (one node per line, empty parent for roots) and
//! a JSON object mapping each diagnosis directly onto its descendant list.
//!
//! The `_LIQUID_` sentinel covers the Lymphoid and Myeloid subtrees;
//! `_SOLID_` is its complement over all nodes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use crate::error::{EngineError, Result};

const LIQUID_ROOTS: [&str; 2] = ["Lymphoid", "Myeloid"];

/// Outcome of expanding one diagnosis string.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    /// `All Tumors`: the diagnosis constraint is dropped entirely.
    Unconstrained,
    Names(Vec<String>),
    /// Name absent from the taxonomy; the predicate passes through as-is.
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct Oncotree {
    children: HashMap<String, Vec<String>>,
    /// Every node name, in file order.
    names: Vec<String>,
    /// True when `children` already holds the transitive closure (the
    /// JSON source) rather than one-hop edges.
    closed: bool,
}

impl Oncotree {
    /// Dispatch on file extension: `.json` is the flat descendant map,
    /// anything else parses as the TSV hierarchy.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::TumorTree(format!("cannot read {}: {e}", path.display()))
        })?;
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            Self::from_json(&raw)
        } else {
            Self::from_tsv(&raw)
        }
    }

    pub fn from_tsv(raw: &str) -> Result<Self> {
        let mut edges = Vec::new();
        for line in raw.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            let name = parts.next().unwrap_or("").trim();
            let parent = parts.next().map(str::trim).filter(|p| !p.is_empty());
            if name.is_empty() {
                continue;
            }
            edges.push((name.to_string(), parent.map(str::to_string)));
        }
        Ok(Self::from_edges(edges))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let map: HashMap<String, Vec<String>> = serde_json::from_str(raw)?;
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        for (name, descendants) in &map {
            if seen.insert(name.clone()) {
                names.push(name.clone());
            }
            for d in descendants {
                if seen.insert(d.clone()) {
                    names.push(d.clone());
                }
            }
        }
        names.sort();
        Ok(Self {
            children: map,
            names,
            closed: true,
        })
    }

    pub fn from_edges(edges: Vec<(String, Option<String>)>) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        for (name, parent) in edges {
            if seen.insert(name.clone()) {
                names.push(name.clone());
            }
            if let Some(parent) = parent {
                if seen.insert(parent.clone()) {
                    names.push(parent.clone());
                }
                children.entry(parent).or_default().push(name);
            }
        }
        Self {
            children,
            names,
            closed: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Node plus all transitive descendants, duplicates removed.
    pub fn descendants(&self, name: &str) -> Option<Vec<String>> {
        if !self.names.iter().any(|n| n == name) {
            return None;
        }
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        if self.closed {
            // one hop: the map entry already lists every descendant
            seen.insert(name.to_string());
            out.push(name.to_string());
            for d in self.children.get(name).into_iter().flatten() {
                if seen.insert(d.clone()) {
                    out.push(d.clone());
                }
            }
            return Some(out);
        }
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            out.push(current.clone());
            if let Some(kids) = self.children.get(&current) {
                for k in kids {
                    queue.push_back(k.clone());
                }
            }
        }
        Some(out)
    }

    fn liquid_set(&self) -> HashSet<String> {
        let mut set = HashSet::new();
        for root in LIQUID_ROOTS {
            if let Some(nodes) = self.descendants(root) {
                set.extend(nodes);
            }
        }
        set
    }

    pub fn liquid_names(&self) -> Vec<String> {
        let liquid = self.liquid_set();
        self.names
            .iter()
            .filter(|n| liquid.contains(*n))
            .cloned()
            .collect()
    }

    pub fn solid_names(&self) -> Vec<String> {
        let liquid = self.liquid_set();
        self.names
            .iter()
            .filter(|n| !liquid.contains(*n))
            .cloned()
            .collect()
    }

    pub fn expand(&self, diagnosis: &str) -> Expansion {
        match diagnosis {
            "All Tumors" => Expansion::Unconstrained,
            d if d.ends_with("_LIQUID_") || d == "All Liquid Tumors" => {
                Expansion::Names(self.liquid_names())
            }
            d if d.ends_with("_SOLID_") || d == "All Solid Tumors" => {
                Expansion::Names(self.solid_names())
            }
            d => match self.descendants(d) {
                Some(names) => Expansion::Names(names),
                None => Expansion::NotFound,
            },
        }
    }
}
