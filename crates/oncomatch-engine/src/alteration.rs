//! Human-readable alteration strings for emitted matches.
//!
//! Positive matches are described from the stored genomic row; negative
//! matches have no row, so the description is synthesized from what the
//! criterion asked for (`!BRAF p.V600`).

use serde_json::Value;

use crate::criteria::GenomicShape;
use crate::normalize;
use oncomatch_store::Document;

pub const MATCH_TYPE_VARIANT: &str = "variant";
pub const MATCH_TYPE_GENE: &str = "gene";

fn text(row: &Document, field: &str) -> Option<String> {
    row.get(field)
        .filter(|v| !v.is_null())
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Describe a matched genomic row. Returns the alteration string and the
/// match type (`variant` when the criterion constrained protein change).
pub fn format_alteration(row: &Document, shape: &GenomicShape) -> (String, &'static str) {
    let match_type = if shape.protein_change_display.is_some() {
        MATCH_TYPE_VARIANT
    } else {
        MATCH_TYPE_GENE
    };

    let mut parts: Vec<String> = Vec::new();
    if row.get("wildtype") == Some(&Value::Bool(true)) {
        parts.push("wt".into());
    }
    if let Some(gene) = text(row, "true_hugo_symbol") {
        parts.push(gene);
    }
    if let Some(pc) = text(row, "true_protein_change") {
        parts.push(pc);
    } else if let Some(cnv) = text(row, "cnv_call") {
        parts.push(cnv);
    } else if let Some(class) = text(row, "true_variant_classification") {
        parts.push(class);
    } else if text(row, "variant_category").as_deref() == Some(normalize::SV) {
        parts.push("Structural Variation".into());
    } else if text(row, "variant_category").as_deref() == Some(normalize::SIGNATURE) {
        if let Some(display) = text(row, "mmr_status")
            .as_deref()
            .and_then(normalize::mmr_display)
        {
            parts.push(display.into());
        }
    }

    (parts.join(" "), match_type)
}

/// Describe a negative match from the criterion shape. The `!` rides on
/// the gene when there is one, otherwise it moves to the front.
pub fn format_negative(shape: &GenomicShape) -> (String, &'static str) {
    let mut match_type = MATCH_TYPE_GENE;
    let mut parts: Vec<String> = Vec::new();

    if let Some(gene) = &shape.gene {
        parts.push(format!("!{gene}"));
    }
    if let Some(pc) = &shape.protein_change_display {
        parts.push(pc.clone());
        match_type = MATCH_TYPE_VARIANT;
    } else if let Some(cnv) = &shape.cnv_call {
        parts.push(cnv.clone());
    } else if let Some(class) = &shape.variant_classification {
        parts.push(class.clone());
    } else if shape.is_sv {
        parts.push("Structural Variation".into());
    }

    if shape.gene.is_none() && !parts.is_empty() {
        parts[0] = format!("!{}", parts[0]);
    }

    (parts.join(" "), match_type)
}
