//! Match record emission.
//!
//! Turns the traverser's per-sample evidence into `TrialMatch` records
//! annotated with trial context (protocol, level, accrual status,
//! cancer-type specificity, coordinating center) and the projected
//! clinical document fields.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::query::Evidence;
use crate::trial::{TreatmentNode, Trial, TRIAL_STATUS_CLOSED};
use oncomatch_common::TrialMatch;
use oncomatch_store::{FieldCond, Predicate, Store, COLLECTION_CLINICAL};

const CLINICAL_PROJECTION: &[&str] = &[
    "sample_id",
    "ord_physician_name",
    "ord_physician_email",
    "oncotree_primary_diagnosis_name",
    "report_date",
    "vital_status",
    "first_last",
    "gender",
    "_id",
];

/// Emit one match per (sample, evidence record) at a treatment node.
pub async fn emit_matches(
    store: &dyn Store,
    evidence_by_sample: &HashMap<String, Vec<Evidence>>,
    mrn_map: &HashMap<String, String>,
    trial: &Trial,
    node: &TreatmentNode,
) -> Result<Vec<TrialMatch>> {
    if evidence_by_sample.is_empty() {
        return Ok(vec![]);
    }

    // One clinical lookup for every surviving sample.
    let sample_ids: Vec<Value> = evidence_by_sample.keys().cloned().map(Value::from).collect();
    let clinical_rows = store
        .find(
            COLLECTION_CLINICAL,
            &Predicate::field("sample_id", FieldCond::In(sample_ids)),
            Some(CLINICAL_PROJECTION),
        )
        .await?;
    let clinical_by_sample: HashMap<&str, &oncomatch_store::Document> = clinical_rows
        .iter()
        .filter_map(|doc| {
            doc.get("sample_id")
                .and_then(Value::as_str)
                .map(|sid| (sid, doc))
        })
        .collect();

    let mut status = trial.accrual_status();
    if node.suspended {
        status = TRIAL_STATUS_CLOSED;
    }

    // Deterministic emission order regardless of map iteration.
    let mut samples: Vec<&String> = evidence_by_sample.keys().collect();
    samples.sort();

    let mut out = Vec::new();
    for sample_id in samples {
        for record in &evidence_by_sample[sample_id] {
            let mut m = TrialMatch {
                sample_id: sample_id.clone(),
                mrn: mrn_map.get(sample_id).cloned(),
                protocol_no: trial.protocol_no.clone(),
                nct_id: trial.nct_id.clone(),
                match_level: Some(node.level.as_str().to_string()),
                internal_id: node.internal_id.clone(),
                code: node.code.clone(),
                arm_name: node.arm_name.clone(),
                arm_description: node.arm_description.clone(),
                genomic_alteration: Some(record.genomic_alteration.clone()),
                match_type: record.match_type.clone(),
                clinical_only: record.clinical_only,
                trial_accrual_status: Some(status.to_string()),
                cancer_type_match: Some(trial.cancer_type_match().to_string()),
                coordinating_center: Some(trial.coordinating_center()),
                ..Default::default()
            };

            // Copy the genomic payload, pulling out the fields the sorter
            // reads so they are not duplicated by the flatten.
            m.extra = record.payload.clone();
            if let Some(tier) = m.extra.remove("tier").and_then(|v| v.as_i64()) {
                m.tier = Some(tier);
            }
            if let Some(Value::String(vc)) = m.extra.remove("variant_category") {
                m.variant_category = Some(vc);
            }
            if let Some(Value::Bool(wt)) = m.extra.remove("wildtype") {
                m.wildtype = Some(wt);
            }
            if let Some(Value::String(mmr)) = m.extra.remove("mmr_status") {
                m.mmr_status = Some(mmr);
            }

            // The clinical document wins over anything attached earlier.
            if let Some(doc) = clinical_by_sample.get(sample_id.as_str()) {
                for (field, value) in doc.iter() {
                    match field.as_str() {
                        "sample_id" => {}
                        "_id" => {
                            m.extra.insert("clinical_id".into(), value.clone());
                        }
                        _ => {
                            m.extra.insert(field.clone(), value.clone());
                        }
                    }
                }
            }

            out.push(m);
        }
    }
    Ok(out)
}
