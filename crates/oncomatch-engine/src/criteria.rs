//! Leaf criterion parsing and compilation.
//!
//! A match-tree leaf arrives as a loose key/value mapping authored by
//! trial curators. Parsing turns it into a typed criteria struct (unknown
//! keys are dropped here, not at evaluation time); compilation turns the
//! struct into a store predicate plus the flags the evaluator needs:
//! whether the leaf is negated as a whole and whether it targets
//! structural variants.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::age;
use crate::normalize;
use crate::oncotree::{Expansion, Oncotree};
use oncomatch_store::{FieldCond, Predicate};

// ---------------------------------------------------------------------------
// Parsed criteria
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicalCriteria {
    pub oncotree_primary_diagnosis: Option<OneOrMany>,
    pub age_numerical: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenomicCriteria {
    pub hugo_symbol: Option<String>,
    pub variant_category: Option<String>,
    pub protein_change: Option<String>,
    pub wildcard_protein_change: Option<String>,
    pub variant_classification: Option<String>,
    pub exon: Option<String>,
    pub cnv_call: Option<String>,
    pub wildtype: Option<String>,
    pub mmr_status: Option<String>,
    pub ms_status: Option<String>,
    pub annotated_variant: Option<String>,
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl ClinicalCriteria {
    pub fn from_value(map: &Map<String, Value>) -> Self {
        let mut out = Self::default();
        for (key, value) in map {
            match key.to_lowercase().as_str() {
                "oncotree_primary_diagnosis" => {
                    out.oncotree_primary_diagnosis = match value {
                        Value::Array(items) => Some(OneOrMany::Many(
                            items.iter().filter_map(value_text).collect(),
                        )),
                        other => value_text(other).map(OneOrMany::One),
                    };
                }
                "age_numerical" => out.age_numerical = value_text(value),
                "gender" => out.gender = value_text(value),
                other => debug!(key = other, "dropping unrecognized clinical key"),
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.oncotree_primary_diagnosis.is_none()
            && self.age_numerical.is_none()
            && self.gender.is_none()
    }
}

impl GenomicCriteria {
    pub fn from_value(map: &Map<String, Value>) -> Self {
        let mut out = Self::default();
        for (key, value) in map {
            let Some(text) = value_text(value) else {
                debug!(key = %key, "dropping non-scalar genomic value");
                continue;
            };
            match key.to_lowercase().as_str() {
                "hugo_symbol" => out.hugo_symbol = Some(text),
                "variant_category" => out.variant_category = Some(text),
                "protein_change" => out.protein_change = Some(text),
                "wildcard_protein_change" => out.wildcard_protein_change = Some(text),
                "variant_classification" => out.variant_classification = Some(text),
                "exon" => out.exon = Some(text),
                "cnv_call" => out.cnv_call = Some(text),
                "wildtype" => out.wildtype = Some(text),
                "mmr_status" => out.mmr_status = Some(text),
                "ms_status" => out.ms_status = Some(text),
                "annotated_variant" => out.annotated_variant = Some(text),
                other => debug!(key = other, "dropping unrecognized genomic key"),
            }
        }
        out
    }

    fn fields_set(&self) -> usize {
        [
            self.hugo_symbol.is_some(),
            self.variant_category.is_some(),
            self.protein_change.is_some(),
            self.wildcard_protein_change.is_some(),
            self.variant_classification.is_some(),
            self.exon.is_some(),
            self.cnv_call.is_some(),
            self.wildtype.is_some(),
            self.mmr_status.is_some(),
            self.ms_status.is_some(),
            self.annotated_variant.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    fn any_general_key(&self) -> bool {
        self.variant_category.is_some()
            || self.protein_change.is_some()
            || self.wildcard_protein_change.is_some()
            || self.variant_classification.is_some()
            || self.exon.is_some()
            || self.cnv_call.is_some()
            || self.wildtype.is_some()
            || self.mmr_status.is_some()
            || self.ms_status.is_some()
    }

    /// Whether the general (field-by-field) matcher applies: the leaf
    /// carries at least one general key, or is a lone gene constraint.
    pub fn wants_general(&self) -> bool {
        self.any_general_key() || (self.fields_set() == 1 && self.hugo_symbol.is_some())
    }

    /// Whether the annotation-index matcher applies.
    pub fn wants_annotated(&self) -> bool {
        self.hugo_symbol.is_some() && self.annotated_variant.is_some()
    }
}

// ---------------------------------------------------------------------------
// Compiled forms
// ---------------------------------------------------------------------------

/// What the criterion constrained, kept for alteration formatting after
/// the query has run (the predicate itself is not introspected).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenomicShape {
    pub gene: Option<String>,
    /// Display text of the protein-change constraint: the exact change
    /// for equality, the stem for wildcards (`p.V600`).
    pub protein_change_display: Option<String>,
    pub cnv_call: Option<String>,
    pub variant_classification: Option<String>,
    pub is_sv: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledClinical {
    /// `None`: nothing usable was specified; the leaf matches no one.
    pub filter: Option<Predicate>,
}

#[derive(Debug, Clone)]
pub struct CompiledGenomic {
    pub filter: Option<Predicate>,
    /// Any `!`-prefixed value flips the leaf to complement semantics.
    pub negative: bool,
    pub is_sv: bool,
    pub shape: GenomicShape,
}

fn strip_neg<'a>(raw: &'a str, neg: &mut bool) -> &'a str {
    match raw.strip_prefix('!') {
        Some(rest) => {
            *neg = true;
            rest
        }
        None => raw,
    }
}

fn set_cond(conds: &mut Vec<(&'static str, FieldCond)>, field: &'static str, cond: FieldCond) {
    if let Some(slot) = conds.iter_mut().find(|(f, _)| *f == field) {
        slot.1 = cond;
    } else {
        conds.push((field, cond));
    }
}

fn conds_to_predicate(conds: Vec<(&'static str, FieldCond)>) -> Predicate {
    let fields: Vec<Predicate> = conds
        .into_iter()
        .map(|(f, c)| Predicate::field(f, c))
        .collect();
    if fields.len() == 1 {
        fields.into_iter().next().expect("one element")
    } else {
        Predicate::And(fields)
    }
}

/// Whole-word gene search over the pathologist comment.
fn sv_comment_pattern(gene: &str) -> String {
    format!(r"(.*\W{gene}\W.*)|(^{gene}\W.*)|(.*\W{gene}$)")
}

// ---------------------------------------------------------------------------
// Clinical compilation
// ---------------------------------------------------------------------------

/// Expand one diagnosis through the taxonomy into (include, exclude)
/// name lists. Returns `None` when the diagnosis lifts the constraint
/// (`All Tumors`).
fn expand_diagnosis(diag: &OneOrMany, oncotree: &Oncotree) -> Option<Vec<FieldCond>> {
    let mut include: Vec<String> = Vec::new();
    let mut exclude: Vec<String> = Vec::new();
    let mut scalar_pass_through: Option<FieldCond> = None;

    let items: Vec<&String> = match diag {
        OneOrMany::One(v) => vec![v],
        OneOrMany::Many(vs) => vs.iter().collect(),
    };
    let scalar = matches!(diag, OneOrMany::One(_));

    for item in items {
        let mut neg = false;
        let bare = strip_neg(item, &mut neg);
        match oncotree.expand(bare) {
            Expansion::Unconstrained => {
                if !neg {
                    // All Tumors anywhere on the include side drops the
                    // whole diagnosis constraint.
                    return None;
                }
            }
            Expansion::Names(names) => {
                let target = if neg { &mut exclude } else { &mut include };
                for n in names {
                    if !target.contains(&n) {
                        target.push(n);
                    }
                }
            }
            Expansion::NotFound => {
                if scalar {
                    // Unexpandable scalar passes through as-is.
                    scalar_pass_through = Some(if neg {
                        FieldCond::Ne(Value::from(bare))
                    } else {
                        FieldCond::Eq(Value::from(bare))
                    });
                } else if neg {
                    exclude.push(bare.to_string());
                } else {
                    include.push(bare.to_string());
                }
            }
        }
    }

    if let Some(cond) = scalar_pass_through {
        return Some(vec![cond]);
    }

    let mut conds = Vec::new();
    if !include.is_empty() {
        conds.push(FieldCond::In(
            include.into_iter().map(Value::from).collect(),
        ));
    }
    if !exclude.is_empty() {
        conds.push(FieldCond::Nin(
            exclude.into_iter().map(Value::from).collect(),
        ));
    }
    Some(conds)
}

pub fn compile_clinical(
    crit: &ClinicalCriteria,
    oncotree: &Oncotree,
    today: NaiveDate,
) -> CompiledClinical {
    if crit.is_empty() {
        return CompiledClinical { filter: None };
    }

    let mut fields: Vec<Predicate> = Vec::new();

    if let Some(diag) = &crit.oncotree_primary_diagnosis {
        match expand_diagnosis(diag, oncotree) {
            None => {} // unconstrained
            Some(conds) => {
                for cond in conds {
                    fields.push(Predicate::field("oncotree_primary_diagnosis_name", cond));
                }
            }
        }
    }

    if let Some(expr) = &crit.age_numerical {
        match age::birth_date_cond(expr, today) {
            Ok(cond) => fields.push(Predicate::field("birth_date", cond)),
            Err(e) => {
                warn!(error = %e, expr = %expr, "unusable age criterion, leaf matches nothing");
                return CompiledClinical { filter: None };
            }
        }
    }

    if let Some(gender) = &crit.gender {
        let mut neg = false;
        let bare = strip_neg(gender, &mut neg);
        let cond = if neg {
            FieldCond::Ne(Value::from(bare))
        } else {
            FieldCond::Eq(Value::from(bare))
        };
        fields.push(Predicate::field("gender", cond));
    }

    let filter = match fields.len() {
        0 => Predicate::True,
        1 => fields.into_iter().next().expect("one element"),
        _ => Predicate::And(fields),
    };
    CompiledClinical {
        filter: Some(filter),
    }
}

// ---------------------------------------------------------------------------
// Genomic compilation
// ---------------------------------------------------------------------------

pub fn compile_genomic(crit: &GenomicCriteria) -> CompiledGenomic {
    let mut conds: Vec<(&'static str, FieldCond)> = Vec::new();
    let mut negative = false;
    let mut is_sv = false;
    let mut shape = GenomicShape::default();
    let wildtype_specified = crit.wildtype.is_some();

    let empty = |negative, is_sv, shape| CompiledGenomic {
        filter: None,
        negative,
        is_sv,
        shape,
    };

    if let Some(raw) = &crit.hugo_symbol {
        let bare = strip_neg(raw, &mut negative);
        shape.gene = Some(bare.to_string());
        set_cond(&mut conds, "true_hugo_symbol", FieldCond::Eq(Value::from(bare)));
    }

    if let Some(raw) = &crit.variant_category {
        if raw.trim().eq_ignore_ascii_case("any variation") {
            set_cond(
                &mut conds,
                "variant_category",
                FieldCond::In(vec![
                    Value::from(normalize::MUTATION),
                    Value::from(normalize::CNV),
                ]),
            );
        } else {
            let normalized = normalize::normalize_value("variant_category", raw);
            let text = normalized.as_str().unwrap_or_default().to_string();
            let bare = strip_neg(&text, &mut negative);
            if bare == normalize::SV {
                is_sv = true;
                shape.is_sv = true;
            }
            set_cond(
                &mut conds,
                "variant_category",
                FieldCond::Eq(Value::from(bare)),
            );
        }
    }

    if let Some(raw) = &crit.protein_change {
        let bare = strip_neg(raw, &mut negative);
        shape.protein_change_display = Some(bare.to_string());
        set_cond(
            &mut conds,
            "true_protein_change",
            FieldCond::Eq(Value::from(bare)),
        );
    }

    if let Some(raw) = &crit.wildcard_protein_change {
        let bare = strip_neg(raw, &mut negative);
        // By convention all protein changes begin with "p."
        let stem = if bare.starts_with("p.") {
            bare.to_string()
        } else {
            format!("p.{bare}")
        };
        shape.protein_change_display = Some(stem.clone());
        // The terminal amino acid is the wildcard.
        set_cond(
            &mut conds,
            "true_protein_change",
            FieldCond::Regex {
                patterns: vec![format!("^{stem}[A-Z]")],
                case_insensitive: false,
            },
        );
    }

    if let Some(raw) = &crit.variant_classification {
        let bare = strip_neg(raw, &mut negative);
        shape.variant_classification = Some(bare.to_string());
        set_cond(
            &mut conds,
            "true_variant_classification",
            FieldCond::Eq(Value::from(bare)),
        );
    }

    if let Some(raw) = &crit.exon {
        let bare = strip_neg(raw, &mut negative);
        match bare.trim().parse::<i64>() {
            Ok(n) => set_cond(
                &mut conds,
                "true_transcript_exon",
                FieldCond::Eq(Value::from(n)),
            ),
            Err(_) => {
                warn!(exon = %raw, "exon criterion is not an integer, leaf matches nothing");
                return empty(negative, is_sv, shape);
            }
        }
    }

    if let Some(raw) = &crit.cnv_call {
        let normalized = normalize::normalize_value("cnv_call", raw);
        let text = normalized.as_str().unwrap_or_default().to_string();
        let bare = strip_neg(&text, &mut negative);
        shape.cnv_call = Some(bare.to_string());
        set_cond(&mut conds, "cnv_call", FieldCond::Eq(Value::from(bare)));
    }

    if let Some(raw) = &crit.wildtype {
        let bare = strip_neg(raw, &mut negative);
        match bare.trim().to_lowercase().as_str() {
            "true" => set_cond(&mut conds, "wildtype", FieldCond::Eq(Value::Bool(true))),
            "false" => set_cond(&mut conds, "wildtype", FieldCond::Eq(Value::Bool(false))),
            other => {
                warn!(wildtype = other, "wildtype must be true or false, leaf matches nothing");
                return empty(negative, is_sv, shape);
            }
        }
    }

    for (external, value) in [
        ("mmr_status", &crit.mmr_status),
        ("ms_status", &crit.ms_status),
    ] {
        if let Some(raw) = value {
            let bare = strip_neg(raw, &mut negative);
            let mapped = normalize::normalize_value(external, bare);
            set_cond(&mut conds, "mmr_status", FieldCond::Eq(mapped));
        }
    }

    if conds.is_empty() {
        return empty(negative, is_sv, shape);
    }

    // Structural variants match on the pathologist comment, not the gene
    // column.
    if is_sv {
        if let Some(pos) = conds.iter().position(|(f, _)| *f == "true_hugo_symbol") {
            conds.remove(pos);
            if let Some(gene) = &shape.gene {
                set_cond(
                    &mut conds,
                    "structural_variant_comment",
                    FieldCond::Regex {
                        patterns: vec![sv_comment_pattern(gene)],
                        case_insensitive: true,
                    },
                );
            }
        }
    }

    let filter = if wildtype_specified {
        conds_to_predicate(conds)
    } else {
        // MMR signatures carry no gene; drop the symbol before defaulting.
        if conds.iter().any(|(f, _)| *f == "mmr_status") {
            conds.retain(|(f, _)| *f != "true_hugo_symbol");
        }
        if conds.is_empty() {
            return empty(negative, is_sv, shape);
        }
        Predicate::And(vec![
            conds_to_predicate(conds),
            Predicate::Or(vec![
                Predicate::field("wildtype", FieldCond::Eq(Value::Bool(false))),
                Predicate::field("wildtype", FieldCond::Exists(false)),
            ]),
        ])
    };

    CompiledGenomic {
        filter: Some(filter),
        negative,
        is_sv,
        shape,
    }
}
