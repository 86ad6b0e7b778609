//! Shared fixtures: the ten-sample population and the taxonomy used
//! across the integration suites.
#![allow(dead_code)] // each test binary uses a different subset

use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

use oncomatch_engine::{Oncotree, QueryEvaluator};
use oncomatch_store::{Document, MemoryStore, Store};

pub fn doc(v: Value) -> Document {
    v.as_object().expect("fixture must be an object").clone()
}

/// Frozen clock: every age assertion in the suite assumes this date.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 11, 3).unwrap()
}

pub fn oncotree() -> Oncotree {
    let e = |n: &str, p: &str| (n.to_string(), Some(p.to_string()));
    Oncotree::from_edges(vec![
        ("Tissue".to_string(), None),
        // liquid subtrees
        e("Lymphoid", "Tissue"),
        e("Lymphoma", "Lymphoid"),
        e("Hodgkin Lymphoma", "Lymphoma"),
        e("Myeloid", "Tissue"),
        e("Acute Myeloid Leukemia", "Myeloid"),
        e("Myelodysplasia", "Myeloid"),
        // solid subtrees
        e("Adrenal Gland", "Tissue"),
        e("Melanoma", "Tissue"),
        e("Cutaneous Melanoma", "Melanoma"),
        e("Acral Melanoma", "Melanoma"),
        e("Glioma", "Tissue"),
        e("Glioblastoma", "Glioma"),
        e("Glioblastoma Multiforme", "Glioblastoma"),
        e("Gliosarcoma", "Glioblastoma"),
        e("Non-Small Cell Lung Cancer", "Tissue"),
    ])
}

/// Ten samples:
///   S1  adult  Adrenal Gland  F  BRAF p.F346R mutation
///   S2  adult  Melanoma       F  EGFR p.L858R mutation
///   S3  adult  Melanoma       F  EGFR p.F346A mutation
///   S4  adult  Melanoma       F  EGFR p.F346B mutation
///   S5  adult  Melanoma       F  EGFR p.F000F mutation
///   S6  child  Melanoma       M  EGFR SV
///   S7  child  Glioblastoma   M  EGFR heterozygous deletion
///   S8  child  Glioblastoma   M  EGFR gain
///   S9  child  Glioblastoma   M  EGFR homozygous deletion
///   S10 infant Glioblastoma   M  EGFR high level amplification
pub async fn seed_population(store: &MemoryStore) {
    let diagnoses = [
        "Adrenal Gland",
        "Melanoma",
        "Melanoma",
        "Melanoma",
        "Melanoma",
        "Melanoma",
        "Glioblastoma",
        "Glioblastoma",
        "Glioblastoma",
        "Glioblastoma",
    ];
    let birth_dates = [
        "1997-11-03",
        "1997-11-03",
        "1997-11-03",
        "1997-11-03",
        "1997-11-03",
        "2010-11-03",
        "2010-11-03",
        "2010-11-03",
        "2010-11-03",
        "2016-09-03",
    ];
    let clinical: Vec<Document> = (0..10)
        .map(|i| {
            doc(json!({
                "_id": format!("c{}", i + 1),
                "sample_id": format!("S{}", i + 1),
                "mrn": format!("P{}", i + 1),
                "oncotree_primary_diagnosis_name": diagnoses[i],
                "birth_date": birth_dates[i],
                "gender": if i < 5 { "Female" } else { "Male" },
                "vital_status": "alive",
                "report_date": "2016-11-03",
            }))
        })
        .collect();
    store.insert_many("clinical", clinical).await.unwrap();

    let genes = [
        "BRAF", "EGFR", "EGFR", "EGFR", "EGFR", "EGFR", "EGFR", "EGFR", "EGFR", "EGFR",
    ];
    let protein_changes = [
        Some("p.F346R"),
        Some("p.L858R"),
        Some("p.F346A"),
        Some("p.F346B"),
        Some("p.F000F"),
        None,
        None,
        None,
        None,
        None,
    ];
    let categories = [
        "MUTATION", "MUTATION", "MUTATION", "MUTATION", "MUTATION", "SV", "CNV", "CNV", "CNV",
        "CNV",
    ];
    let cnv_calls = [
        None,
        None,
        None,
        None,
        None,
        None,
        Some("Heterozygous deletion"),
        Some("Gain"),
        Some("Homozygous deletion"),
        Some("High level amplification"),
    ];
    let genomic: Vec<Document> = (0..10)
        .map(|i| {
            let mut d = doc(json!({
                "_id": format!("g{}", i + 1),
                "sample_id": format!("S{}", i + 1),
                "clinical_id": format!("c{}", i + 1),
                "true_hugo_symbol": genes[i],
                "true_variant_classification": "In_Frame_Del",
                "variant_category": categories[i],
                "chromosome": "chr3",
                "position": 178952085,
                "wildtype": false,
                "true_transcript_exon": 19,
            }));
            if let Some(pc) = protein_changes[i] {
                d.insert("true_protein_change".into(), json!(pc));
            }
            if let Some(cnv) = cnv_calls[i] {
                d.insert("cnv_call".into(), json!(cnv));
            }
            d
        })
        .collect();
    store.insert_many("genomic", genomic).await.unwrap();
}

pub fn all_samples(n: usize) -> HashSet<String> {
    (1..=n).map(|i| format!("S{i}")).collect()
}

pub fn evaluator_for(store: MemoryStore, samples: HashSet<String>) -> QueryEvaluator {
    QueryEvaluator {
        store: Arc::new(store),
        all_samples: Arc::new(samples),
        oncotree: Arc::new(oncotree()),
        annotation: None,
        today: today(),
    }
}
