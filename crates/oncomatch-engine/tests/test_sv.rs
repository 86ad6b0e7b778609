//! Structural-variant matching through the pathologist comment.

mod common;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{doc, evaluator_for};
use oncomatch_engine::traverse::evaluate_tree;
use oncomatch_engine::MatchTree;
use oncomatch_store::{MemoryStore, Store};

async fn sv_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert_many(
            "clinical",
            vec![doc(json!({
                "_id": "c1",
                "sample_id": "MATCH",
                "mrn": "MRN00",
                "vital_status": "alive",
                "birth_date": "1900-11-03",
                "oncotree_primary_diagnosis_name": "Glioblastoma Multiforme"
            }))],
        )
        .await
        .unwrap();
    store
        .insert_many(
            "genomic",
            vec![
                doc(json!({
                    "_id": "g1",
                    "sample_id": "MATCH",
                    "variant_category": "SV",
                    "structural_variant_comment":
                        "An ETV6-NTRK3 fusion is identified (chr12:12035285 to chr15:88559895). "
                })),
                doc(json!({
                    "_id": "g2",
                    "sample_id": "MATCH",
                    "variant_category": "SV",
                    "structural_variant_comment":
                        "An ETV6-BRAF fusion is identified (chr12:12035285 to chr15:88559895). "
                })),
            ],
        )
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn ntrk_fusion_matches_by_whole_word() {
    let store = sv_store().await;
    let evaluator = evaluator_for(store, ["MATCH".to_string()].into_iter().collect());

    let tree = MatchTree::build(&json!({
        "and": [
            {"or": [
                {"genomic": {"hugo_symbol": "NTRK1", "variant_category": "Structural Variation"}},
                {"genomic": {"hugo_symbol": "NTRK2", "variant_category": "Structural Variation"}},
                {"genomic": {"hugo_symbol": "NTRK3", "variant_category": "Structural Variation"}}
            ]},
            {"clinical": {"age_numerical": ">=18", "oncotree_primary_diagnosis": "_SOLID_"}}
        ]
    }))
    .unwrap();

    let result = evaluate_tree(&tree, &evaluator, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    let records = &result["MATCH"];
    // only the NTRK3 comment row matched; the BRAF fusion row did not
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].genomic_alteration, "Structural Variation");
    assert_eq!(
        records[0].payload["structural_variant_comment"]
            .as_str()
            .unwrap()
            .contains("ETV6-NTRK3"),
        true
    );
}

#[tokio::test]
async fn ntrk2_alone_does_not_match() {
    let store = sv_store().await;
    let evaluator = evaluator_for(store, ["MATCH".to_string()].into_iter().collect());

    let tree = MatchTree::build(&json!({
        "genomic": {"hugo_symbol": "NTRK2", "variant_category": "Structural Variation"}
    }))
    .unwrap();
    let result = evaluate_tree(&tree, &evaluator, &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn substring_gene_names_do_not_match() {
    // TRK is a substring of NTRK3 but not a whole word in the comment
    let store = sv_store().await;
    let evaluator = evaluator_for(store, ["MATCH".to_string()].into_iter().collect());

    let tree = MatchTree::build(&json!({
        "genomic": {"hugo_symbol": "TRK3", "variant_category": "Structural Variation"}
    }))
    .unwrap();
    let result = evaluate_tree(&tree, &evaluator, &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn sv_match_is_case_insensitive() {
    let store = sv_store().await;
    let evaluator = evaluator_for(store, ["MATCH".to_string()].into_iter().collect());

    let tree = MatchTree::build(&json!({
        "genomic": {"hugo_symbol": "ntrk3", "variant_category": "Structural Variation"}
    }))
    .unwrap();
    let result = evaluate_tree(&tree, &evaluator, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
}
