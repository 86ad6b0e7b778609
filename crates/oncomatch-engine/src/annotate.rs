//! Optional variant annotation service client.
//!
//! Before a run, every (gene, protein change) seen in the genomic
//! collection is sent to the annotation endpoint together with the
//! alterations the trials declare. The response maps each observed change
//! onto the canonical alteration tokens it satisfies; the index built
//! here lets the annotated matcher broaden an equality criterion into
//! set membership. Failure anywhere degrades the run to the general
//! matcher.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::criteria::GenomicCriteria;
use crate::error::{EngineError, Result};
use crate::matchtree::NodeKind;
use crate::trial::TrialTree;
use oncomatch_store::{FieldCond, Predicate, Store, COLLECTION_GENOMIC};

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// gene → observed protein change → canonical alteration tokens.
#[derive(Debug, Clone, Default)]
pub struct AnnotationIndex {
    map: HashMap<String, HashMap<String, Vec<String>>>,
}

impl AnnotationIndex {
    pub fn insert(&mut self, gene: &str, protein_change: &str, token: &str) {
        let tokens = self
            .map
            .entry(gene.to_string())
            .or_default()
            .entry(protein_change.to_string())
            .or_default();
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }

    /// Observed protein changes of `gene` that satisfy the declared
    /// alteration. Sorted for deterministic query order.
    pub fn changes_matching(&self, gene: &str, alteration: &str) -> Vec<String> {
        let Some(changes) = self.map.get(gene) else {
            return vec![];
        };
        let mut out: Vec<String> = changes
            .iter()
            .filter(|(_, tokens)| tokens.iter().any(|t| t == alteration))
            .map(|(pc, _)| pc.clone())
            .collect();
        out.sort();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireVariant {
    #[serde(rename = "hugoSymbol")]
    hugo_symbol: String,
    alteration: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireQuery {
    #[serde(default)]
    id: String,
    #[serde(rename = "hugoSymbol")]
    hugo_symbol: String,
    alteration: String,
}

#[derive(Debug, Serialize)]
struct WireRequest {
    #[serde(rename = "oncokbVariants")]
    variants: Vec<WireVariant>,
    queries: Vec<WireQuery>,
}

#[derive(Debug, Deserialize)]
struct WireResponseItem {
    query: WireQuery,
    #[serde(default)]
    result: Vec<WireVariant>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnnotationClient {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl AnnotationClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::Annotation(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            token: token.into(),
            client,
        })
    }

    /// One batched lookup covering the whole snapshot and trial catalog.
    #[instrument(skip(self, store, trees))]
    pub async fn build_index(
        &self,
        store: &dyn Store,
        trees: &[Arc<TrialTree>],
    ) -> Result<AnnotationIndex> {
        let queries = self.observed_variants(store).await?;
        let variants = declared_variants(trees);
        if queries.is_empty() || variants.is_empty() {
            debug!("nothing to annotate");
            return Ok(AnnotationIndex::default());
        }

        let request = WireRequest { variants, queries };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Annotation(e.to_string()))?
            .error_for_status()
            .map_err(|e| EngineError::Annotation(e.to_string()))?;

        let items: Vec<WireResponseItem> = response
            .json()
            .await
            .map_err(|e| EngineError::Annotation(format!("malformed response: {e}")))?;

        let mut index = AnnotationIndex::default();
        for item in items {
            for hit in item.result {
                index.insert(&hit.hugo_symbol, &item.query.alteration, &hit.alteration);
            }
        }
        info!(genes = index.map.len(), "annotation index built");
        Ok(index)
    }

    /// Every (sample, gene, protein change) triple in the snapshot.
    async fn observed_variants(&self, store: &dyn Store) -> Result<Vec<WireQuery>> {
        let filter = Predicate::And(vec![
            Predicate::field("true_hugo_symbol", FieldCond::Exists(true)),
            Predicate::field("true_protein_change", FieldCond::Exists(true)),
        ]);
        let rows = store
            .find(
                COLLECTION_GENOMIC,
                &filter,
                Some(&["sample_id", "true_hugo_symbol", "true_protein_change"]),
            )
            .await?;
        let mut queries = Vec::new();
        for row in rows {
            let id = row.get("sample_id").and_then(|v| v.as_str()).unwrap_or("");
            let (Some(gene), Some(pc)) = (
                row.get("true_hugo_symbol").and_then(|v| v.as_str()),
                row.get("true_protein_change").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            queries.push(WireQuery {
                id: id.to_string(),
                hugo_symbol: gene.to_string(),
                alteration: pc.to_string(),
            });
        }
        Ok(queries)
    }
}

/// Walk every match tree for genomic leaves declaring annotated variants.
fn declared_variants(trees: &[Arc<TrialTree>]) -> Vec<WireVariant> {
    let mut out: Vec<WireVariant> = Vec::new();
    for tree in trees {
        for node in &tree.nodes {
            for match_node in &node.match_tree.nodes {
                let NodeKind::Genomic(criteria) = &match_node.kind else {
                    continue;
                };
                if let Some(pair) = declared_pair(criteria) {
                    if !out
                        .iter()
                        .any(|v| v.hugo_symbol == pair.hugo_symbol && v.alteration == pair.alteration)
                    {
                        out.push(pair);
                    }
                }
            }
        }
    }
    out
}

fn declared_pair(criteria: &GenomicCriteria) -> Option<WireVariant> {
    let gene = criteria.hugo_symbol.as_deref()?.trim_start_matches('!');
    let alteration = criteria.annotated_variant.as_deref()?.trim_start_matches('!');
    if gene.is_empty() || alteration.is_empty() {
        return None;
    }
    Some(WireVariant {
        hugo_symbol: gene.to_string(),
        alteration: alteration.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_broadens_equality_to_membership() {
        let mut index = AnnotationIndex::default();
        index.insert("BRAF", "p.V600E", "Oncogenic Mutations");
        index.insert("BRAF", "p.V600E", "V600");
        index.insert("BRAF", "p.V600E", "V600E");
        index.insert("BRAF", "p.V600K", "V600");
        index.insert("TP53", "p.H214L", "Oncogenic Mutations");

        assert_eq!(
            index.changes_matching("BRAF", "V600"),
            vec!["p.V600E".to_string(), "p.V600K".to_string()]
        );
        assert_eq!(index.changes_matching("BRAF", "V600E"), vec!["p.V600E"]);
        assert!(index.changes_matching("KRAS", "G12C").is_empty());
    }

    #[test]
    fn duplicate_tokens_collapse() {
        let mut index = AnnotationIndex::default();
        index.insert("BRAF", "p.V600E", "V600");
        index.insert("BRAF", "p.V600E", "V600");
        assert_eq!(index.changes_matching("BRAF", "V600"), vec!["p.V600E"]);
    }

    #[test]
    fn declared_pairs_strip_negation() {
        let criteria = GenomicCriteria {
            hugo_symbol: Some("!BRAF".into()),
            annotated_variant: Some("V600".into()),
            ..Default::default()
        };
        let pair = declared_pair(&criteria).unwrap();
        assert_eq!(pair.hugo_symbol, "BRAF");
        assert_eq!(pair.alteration, "V600");
    }
}
