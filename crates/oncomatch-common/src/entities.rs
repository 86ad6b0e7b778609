/// Core record types for the patient snapshot and the emitted matches.
/// These are Rust representations of the documents held in the store.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Clinical record (one per sample)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicalRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sample_id: String,
    pub mrn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oncotree_primary_diagnosis_name: Option<String>,
    /// ISO date, `YYYY-MM-DD`. Kept as text so a malformed input survives
    /// loading (age criteria simply stop matching that patient).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vital_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord_physician_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord_physician_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_last: Option<String>,
}

// ---------------------------------------------------------------------------
// Genomic record (one per variant call)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenomicRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sample_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_hugo_symbol: Option<String>,
    /// e.g. `p.V600E`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_protein_change: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_variant_classification: Option<String>,
    /// MUTATION | CNV | SV | SIGNATURE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnv_call: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildtype: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_transcript_exon: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmr_status: Option<String>,
    /// Pathologist free text; the only field SV criteria search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structural_variant_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chromosome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_cdna_change: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_allele: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_strand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allele_fraction: Option<f64>,
    /// Curation-supplied evidence tier, 1 (strongest) to 4.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actionability: Option<String>,
}

// ---------------------------------------------------------------------------
// Trial match (one per emitted sample × alteration × treatment level)
// ---------------------------------------------------------------------------

/// A single patient-trial match. Typed fields are the ones the sorter and
/// exporter read back; everything copied verbatim from the clinical and
/// genomic documents rides in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialMatch {
    pub sample_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nct_id: Option<String>,
    /// step | arm | dose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm_description: Option<String>,
    /// Human-readable summary of the matched event, e.g. `EGFR p.L858R`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genomic_alteration: Option<String>,
    /// variant | gene | annotated_variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clinical_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_accrual_status: Option<String>,
    /// all_solid | all_liquid | specific | unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancer_type_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinating_center: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildtype: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmr_status: Option<String>,
    /// Final per-sample rank assigned by the sorter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrialMatch {
    /// Serialize into a store document.
    pub fn to_document(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
