//! trial_match export to CSV or JSON.

use anyhow::Context;
use serde_json::Value;
use std::path::Path;

use oncomatch_common::TrialMatch;

/// Column order of the CSV export; everything else the match carries
/// stays available through the JSON export.
const CSV_FIELDS: &[&str] = &[
    "mrn",
    "sample_id",
    "first_last",
    "protocol_no",
    "nct_id",
    "genomic_alteration",
    "tier",
    "match_type",
    "trial_accrual_status",
    "match_level",
    "code",
    "internal_id",
    "ord_physician_name",
    "ord_physician_email",
    "vital_status",
    "oncotree_primary_diagnosis_name",
    "true_hugo_symbol",
    "true_protein_change",
    "true_variant_classification",
    "variant_category",
    "report_date",
    "chromosome",
    "position",
    "true_cdna_change",
    "reference_allele",
    "true_transcript_exon",
    "canonical_strand",
    "allele_fraction",
    "cnv_call",
    "wildtype",
    "cancer_type_match",
    "coordinating_center",
    "sort_order",
];

fn cell(doc: &serde_json::Map<String, Value>, field: &str) -> String {
    match doc.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn write_csv(matches: &[TrialMatch], path: impl AsRef<Path>) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("cannot create {}", path.as_ref().display()))?;
    writer.write_record(CSV_FIELDS)?;
    for m in matches {
        let doc = m.to_document();
        let row: Vec<String> = CSV_FIELDS.iter().map(|f| cell(&doc, f)).collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json(matches: &[TrialMatch], path: impl AsRef<Path>) -> anyhow::Result<()> {
    let docs: Vec<Value> = matches
        .iter()
        .map(|m| Value::Object(m.to_document()))
        .collect();
    let out = serde_json::to_string_pretty(&docs)?;
    std::fs::write(path.as_ref(), out)
        .with_context(|| format!("cannot write {}", path.as_ref().display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_match() -> TrialMatch {
        let mut m = TrialMatch {
            sample_id: "S1".into(),
            mrn: Some("P1".into()),
            protocol_no: Some("00-001".into()),
            genomic_alteration: Some("EGFR p.L858R".into()),
            tier: Some(1),
            sort_order: Some(0),
            ..Default::default()
        };
        m.extra
            .insert("true_hugo_symbol".into(), Value::String("EGFR".into()));
        m
    }

    #[test]
    fn csv_round_trip() {
        let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write_csv(&[sample_match()], file.path()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("mrn,sample_id"));
        let row = lines.next().unwrap();
        assert!(row.contains("EGFR p.L858R"));
        assert!(row.contains("00-001"));
    }

    #[test]
    fn json_dump_is_an_array() {
        let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write_json(&[sample_match()], file.path()).unwrap();
        let parsed: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["true_hugo_symbol"], "EGFR");
    }
}
