//! Normalisation of trial-authoring vocabulary into database vocabulary.
//!
//! Trial declarations use curation-facing field names and values
//! (`hugo_symbol`, `Mutation`, `MMR-Deficient`, …); the stored documents
//! use the internal names (`true_hugo_symbol`, `MUTATION`,
//! `Deficient (MMR-D / MSI-H)`, …). Both tables are static. A leading `!`
//! survives value mapping so negation can be applied after translation.

use serde_json::Value;

// Variant categories as stored.
pub const MUTATION: &str = "MUTATION";
pub const CNV: &str = "CNV";
pub const SV: &str = "SV";
pub const SIGNATURE: &str = "SIGNATURE";

// Canonical MMR/MSI strings as stored.
pub const MMR_PROFICIENT: &str = "Proficient (MMR-P / MSS)";
pub const MMR_DEFICIENT: &str = "Deficient (MMR-D / MSI-H)";

/// Map a curation field name (case-insensitive) onto the internal
/// document field it constrains. Unrecognized names return `None`.
pub fn internal_field(external: &str) -> Option<&'static str> {
    match external.to_lowercase().as_str() {
        "age_numerical" => Some("birth_date"),
        "exon" => Some("true_transcript_exon"),
        "hugo_symbol" => Some("true_hugo_symbol"),
        "protein_change" | "wildcard_protein_change" => Some("true_protein_change"),
        "oncotree_primary_diagnosis" => Some("oncotree_primary_diagnosis_name"),
        "variant_classification" => Some("true_variant_classification"),
        "variant_category" => Some("variant_category"),
        "cnv_call" => Some("cnv_call"),
        "wildtype" => Some("wildtype"),
        "gender" => Some("gender"),
        "mmr_status" | "ms_status" => Some("mmr_status"),
        _ => None,
    }
}

fn map_enum_value(field: &str, raw: &str) -> Option<Value> {
    match field {
        "variant_category" => match raw {
            "Mutation" => Some(Value::from(MUTATION)),
            "Copy Number Variation" => Some(Value::from(CNV)),
            "Structural Variation" => Some(Value::from(SV)),
            _ => None,
        },
        "cnv_call" => match raw {
            "High Amplification" => Some(Value::from("High level amplification")),
            "Low Amplification" => Some(Value::from("Gain")),
            "Homozygous Deletion" => Some(Value::from("Homozygous deletion")),
            "Heterozygous Deletion" => Some(Value::from("Heterozygous deletion")),
            _ => None,
        },
        "wildtype" => match raw {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        "mmr_status" | "ms_status" => match raw {
            "MMR-Proficient" | "MSI-L" | "MSS" => Some(Value::from(MMR_PROFICIENT)),
            "MMR-Deficient" | "MSI-H" => Some(Value::from(MMR_DEFICIENT)),
            _ => None,
        },
        _ => None,
    }
}

/// Translate a criterion value into database vocabulary. Values outside
/// the tables pass through unchanged; a leading `!` is preserved.
pub fn normalize_value(external_field: &str, raw: &str) -> Value {
    let field = external_field.to_lowercase();
    let (negated, bare) = match raw.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let mapped = map_enum_value(&field, bare);
    match mapped {
        Some(Value::String(s)) if negated => Value::String(format!("!{s}")),
        Some(v) => v,
        None => Value::String(raw.to_string()),
    }
}

/// Display string for a canonical MMR value, used when formatting
/// signature alterations.
pub fn mmr_display(canonical: &str) -> Option<&'static str> {
    match canonical {
        MMR_PROFICIENT => Some("MMR-Proficient"),
        MMR_DEFICIENT => Some("MMR-Deficient"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_translation() {
        assert_eq!(internal_field("age_numerical"), Some("birth_date"));
        assert_eq!(internal_field("EXON"), Some("true_transcript_exon"));
        assert_eq!(internal_field("hugo_symbol"), Some("true_hugo_symbol"));
        assert_eq!(internal_field("protein_change"), Some("true_protein_change"));
        assert_eq!(
            internal_field("wildcard_protein_change"),
            Some("true_protein_change")
        );
        assert_eq!(
            internal_field("oncotree_primary_diagnosis"),
            Some("oncotree_primary_diagnosis_name")
        );
        assert_eq!(internal_field("ms_status"), Some("mmr_status"));
        assert_eq!(internal_field("protocol_id"), None);
    }

    #[test]
    fn value_translation() {
        assert_eq!(
            normalize_value("variant_category", "Mutation"),
            json!("MUTATION")
        );
        assert_eq!(
            normalize_value("variant_category", "Copy Number Variation"),
            json!("CNV")
        );
        assert_eq!(
            normalize_value("variant_category", "Structural Variation"),
            json!("SV")
        );
        assert_eq!(
            normalize_value("cnv_call", "High Amplification"),
            json!("High level amplification")
        );
        assert_eq!(
            normalize_value("cnv_call", "Homozygous Deletion"),
            json!("Homozygous deletion")
        );
        assert_eq!(normalize_value("wildtype", "true"), json!(true));
        assert_eq!(normalize_value("wildtype", "false"), json!(false));
    }

    #[test]
    fn negation_survives_mapping() {
        assert_eq!(
            normalize_value("variant_category", "!Mutation"),
            json!("!MUTATION")
        );
        assert_eq!(
            normalize_value("mmr_status", "!MMR-Deficient"),
            json!(format!("!{MMR_DEFICIENT}"))
        );
    }

    #[test]
    fn unknown_values_pass_through() {
        assert_eq!(normalize_value("cnv_call", "Gain"), json!("Gain"));
        assert_eq!(
            normalize_value("gender", "Female"),
            json!("Female")
        );
    }

    #[test]
    fn mmr_values_translate_both_ways() {
        assert_eq!(
            normalize_value("ms_status", "MSI-H"),
            json!(MMR_DEFICIENT)
        );
        assert_eq!(normalize_value("ms_status", "MSS"), json!(MMR_PROFICIENT));
        assert_eq!(normalize_value("ms_status", "MSI-L"), json!(MMR_PROFICIENT));
        assert_eq!(mmr_display(MMR_DEFICIENT), Some("MMR-Deficient"));
        assert_eq!(mmr_display(MMR_PROFICIENT), Some("MMR-Proficient"));
    }
}
