//! Match tree traversal.
//!
//! Post-order pass: every leaf queries the store, every internal node
//! combines child sample sets (`and` = intersection, `or` = union).
//! A second pass reconstructs per-sample evidence: genomic leaves
//! contribute their alteration records; clinical leaves either join those
//! records (attaching the declared clinical attributes) or, when no
//! genomic relative exists anywhere above them, emit clinical-only
//! records.

use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::criteria::{ClinicalCriteria, OneOrMany};
use crate::error::{EngineError, Result};
use crate::matchtree::{MatchTree, NodeKind};
use crate::query::{Evidence, QueryEvaluator};

struct ClinicalJoin {
    samples: HashSet<String>,
    criteria: ClinicalCriteria,
}

/// Evaluate one match tree. Returns the surviving samples with their
/// deduplicated evidence records.
pub async fn evaluate_tree(
    tree: &MatchTree,
    evaluator: &QueryEvaluator,
    cancel: &CancellationToken,
) -> Result<HashMap<String, Vec<Evidence>>> {
    let mut sets: Vec<Option<HashSet<String>>> = vec![None; tree.nodes.len()];
    let mut tree_evidence: HashMap<String, Vec<Evidence>> = HashMap::new();
    let mut joins: Vec<ClinicalJoin> = Vec::new();

    for index in tree.postorder() {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let node = &tree.nodes[index];
        let set = match &node.kind {
            NodeKind::Genomic(criteria) => {
                let (sample_ids, evidence) = evaluator.eval_genomic(criteria).await?;
                for record in evidence {
                    tree_evidence
                        .entry(record.sample_id.clone())
                        .or_default()
                        .push(record);
                }
                sample_ids
            }
            NodeKind::Clinical(criteria) => {
                let sample_ids = evaluator.eval_clinical(criteria).await?;
                if tree.has_genomic_relative(index) {
                    joins.push(ClinicalJoin {
                        samples: sample_ids.clone(),
                        criteria: criteria.clone(),
                    });
                } else {
                    for sample_id in &sample_ids {
                        tree_evidence
                            .entry(sample_id.clone())
                            .or_default()
                            .push(Evidence::clinical_only(sample_id.clone()));
                    }
                }
                sample_ids
            }
            NodeKind::And | NodeKind::Or => {
                let mut children = node.children.iter();
                let first = children
                    .next()
                    .expect("builder rejects childless boolean nodes");
                let mut acc = sets[*first]
                    .clone()
                    .expect("post-order guarantees child results");
                for child in children {
                    let other = sets[*child]
                        .as_ref()
                        .expect("post-order guarantees child results");
                    acc = match node.kind {
                        NodeKind::And => acc.intersection(other).cloned().collect(),
                        _ => acc.union(other).cloned().collect(),
                    };
                }
                acc
            }
        };
        sets[index] = Some(set);
    }

    let root = sets[0].take().unwrap_or_default();

    // Cross-attach the declared clinical attributes onto the genomic
    // records of every sample that satisfied the joined clinical leaf.
    for join in &joins {
        for sample_id in join.samples.intersection(&root) {
            if let Some(records) = tree_evidence.get_mut(sample_id) {
                for record in records.iter_mut().filter(|r| !r.clinical_only) {
                    attach_clinical(record, &join.criteria);
                }
            }
        }
    }

    let mut out = HashMap::new();
    for sample_id in root {
        let Some(records) = tree_evidence.get(&sample_id) else {
            warn!(sample_id = %sample_id, "sample survived the tree without evidence, skipped");
            continue;
        };
        let mut seen = HashSet::new();
        let deduped: Vec<Evidence> = records
            .iter()
            .filter(|r| seen.insert(r.dedup_key()))
            .cloned()
            .collect();
        out.insert(sample_id, deduped);
    }
    Ok(out)
}

fn attach_clinical(record: &mut Evidence, criteria: &ClinicalCriteria) {
    if let Some(diagnosis) = &criteria.oncotree_primary_diagnosis {
        let value = match diagnosis {
            OneOrMany::One(v) => serde_json::Value::from(v.clone()),
            OneOrMany::Many(vs) => serde_json::Value::from(vs.clone()),
        };
        record
            .payload
            .entry("oncotree_primary_diagnosis")
            .or_insert(value);
    }
    if let Some(age) = &criteria.age_numerical {
        record
            .payload
            .entry("age_numerical")
            .or_insert_with(|| serde_json::Value::from(age.clone()));
    }
    if let Some(gender) = &criteria.gender {
        record
            .payload
            .entry("gender")
            .or_insert_with(|| serde_json::Value::from(gender.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oncotree::Oncotree;
    use crate::query::QueryEvaluator;
    use chrono::NaiveDate;
    use oncomatch_store::{Document, MemoryStore, Store};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn doc(v: Value) -> Document {
        v.as_object().unwrap().clone()
    }

    async fn evaluator(store: MemoryStore, samples: &[&str]) -> QueryEvaluator {
        QueryEvaluator {
            store: Arc::new(store),
            all_samples: Arc::new(samples.iter().map(|s| s.to_string()).collect()),
            oncotree: Arc::new(Oncotree::from_edges(vec![
                ("Tissue".to_string(), None),
                ("Melanoma".to_string(), Some("Tissue".to_string())),
            ])),
            annotation: None,
            today: NaiveDate::from_ymd_opt(2016, 11, 3).unwrap(),
        }
    }

    async fn seed(store: &MemoryStore) {
        store
            .insert_many(
                "clinical",
                vec![
                    doc(json!({"sample_id": "S1", "mrn": "P1",
                        "oncotree_primary_diagnosis_name": "Melanoma",
                        "birth_date": "1990-01-01", "gender": "Female"})),
                    doc(json!({"sample_id": "S2", "mrn": "P2",
                        "oncotree_primary_diagnosis_name": "Melanoma",
                        "birth_date": "2012-01-01", "gender": "Male"})),
                ],
            )
            .await
            .unwrap();
        store
            .insert_many(
                "genomic",
                vec![
                    doc(json!({"sample_id": "S1", "true_hugo_symbol": "EGFR",
                        "true_protein_change": "p.L858R", "variant_category": "MUTATION",
                        "wildtype": false, "_id": "g1"})),
                    doc(json!({"sample_id": "S2", "true_hugo_symbol": "BRAF",
                        "true_protein_change": "p.V600E", "variant_category": "MUTATION",
                        "wildtype": false, "_id": "g2"})),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn and_intersects_and_attaches_clinical_attributes() {
        let store = MemoryStore::new();
        seed(&store).await;
        let eval = evaluator(store, &["S1", "S2"]).await;

        let tree = MatchTree::build(&json!({
            "and": [
                {"genomic": {"hugo_symbol": "EGFR"}},
                {"clinical": {"age_numerical": ">=18", "oncotree_primary_diagnosis": "Melanoma"}}
            ]
        }))
        .unwrap();

        let result = evaluate_tree(&tree, &eval, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        let records = &result["S1"];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].genomic_alteration, "EGFR p.L858R");
        assert_eq!(records[0].payload["age_numerical"], ">=18");
        assert_eq!(records[0].payload["oncotree_primary_diagnosis"], "Melanoma");
    }

    #[tokio::test]
    async fn or_unions_and_lone_clinical_goes_clinical_only() {
        let store = MemoryStore::new();
        seed(&store).await;
        let eval = evaluator(store, &["S1", "S2"]).await;

        let tree = MatchTree::build(&json!({
            "or": [
                {"clinical": {"gender": "Male"}},
                {"clinical": {"gender": "Female"}}
            ]
        }))
        .unwrap();

        let result = evaluate_tree(&tree, &eval, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert!(result["S1"][0].clinical_only);
        assert_eq!(result["S1"][0].genomic_alteration, "None");
    }

    #[tokio::test]
    async fn duplicate_evidence_collapses() {
        let store = MemoryStore::new();
        seed(&store).await;
        let eval = evaluator(store, &["S1", "S2"]).await;

        // Both branches return the same EGFR row for S1.
        let tree = MatchTree::build(&json!({
            "or": [
                {"genomic": {"hugo_symbol": "EGFR"}},
                {"genomic": {"hugo_symbol": "EGFR", "variant_category": "Mutation"}}
            ]
        }))
        .unwrap();

        let result = evaluate_tree(&tree, &eval, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["S1"].len(), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_between_leaves() {
        let store = MemoryStore::new();
        seed(&store).await;
        let eval = evaluator(store, &["S1", "S2"]).await;
        let tree = MatchTree::build(&json!({"genomic": {"hugo_symbol": "EGFR"}})).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = evaluate_tree(&tree, &eval, &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
