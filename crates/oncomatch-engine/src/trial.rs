//! Trial document parsing and treatment-tree construction.
//!
//! A trial declares step → arm → dose_level; any of the three may carry a
//! `match:` clause. Structural problems are `InvalidTrial`: the trial is
//! skipped and logged, the run continues.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::matchtree::MatchTree;
use oncomatch_store::Document;

pub const TRIAL_STATUS_OPEN: &str = "open";
pub const TRIAL_STATUS_CLOSED: &str = "closed";

// ---------------------------------------------------------------------------
// Typed trial document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nct_id: Option<String>,
    #[serde(rename = "_summary", skip_serializing_if = "Option::is_none")]
    pub summary: Option<TrialSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment_list: Option<TreatmentList>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tumor_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinating_center: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Vec<StatusEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreatmentList {
    #[serde(default)]
    pub step: Vec<Step>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_internal_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_code: Option<Value>,
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_clauses: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arm: Vec<Arm>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm_internal_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm_code: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm_name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm_description: Option<Value>,
    /// "Y" suspends accrual for the arm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm_suspended: Option<String>,
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_clauses: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dose_level: Vec<DoseLevel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoseLevel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_internal_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_code: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_suspended: Option<String>,
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_clauses: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trial {
    pub fn from_document(doc: &Document) -> Result<Self> {
        let trial: Trial = serde_json::from_value(Value::Object(doc.clone()))
            .map_err(|e| EngineError::InvalidTrial(e.to_string()))?;
        trial.validate()?;
        Ok(trial)
    }

    fn validate(&self) -> Result<()> {
        if self.protocol_no.is_none() && self.nct_id.is_none() {
            return Err(EngineError::InvalidTrial(
                "trial has neither protocol_no nor nct_id".into(),
            ));
        }
        if self.treatment_list.is_none() {
            return Err(EngineError::InvalidTrial(format!(
                "trial {} has no treatment_list",
                self.label()
            )));
        }
        Ok(())
    }

    /// protocol_no where present, nct_id otherwise.
    pub fn label(&self) -> String {
        self.protocol_no
            .clone()
            .or_else(|| self.nct_id.clone())
            .unwrap_or_else(|| "<unidentified>".into())
    }

    /// "open" unless the summary says the trial is not open to accrual.
    pub fn accrual_status(&self) -> &'static str {
        if let Some(status) = self
            .summary
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .and_then(|s| s.first())
            .and_then(|s| s.value.as_ref())
        {
            if status.to_lowercase() != "open to accrual" {
                return TRIAL_STATUS_CLOSED;
            }
        }
        TRIAL_STATUS_OPEN
    }

    /// all_solid / all_liquid / specific, or unknown without a summary.
    pub fn cancer_type_match(&self) -> &'static str {
        let Some(tumor_types) = self.summary.as_ref().and_then(|s| s.tumor_types.as_ref())
        else {
            return "unknown";
        };
        if tumor_types.iter().any(|t| t == "_SOLID_") {
            "all_solid"
        } else if tumor_types.iter().any(|t| t == "_LIQUID_") {
            "all_liquid"
        } else {
            "specific"
        }
    }

    pub fn coordinating_center(&self) -> String {
        self.summary
            .as_ref()
            .and_then(|s| s.coordinating_center.clone())
            .unwrap_or_else(|| "unknown".into())
    }
}

// ---------------------------------------------------------------------------
// Treatment tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLevel {
    Step,
    Arm,
    Dose,
}

impl MatchLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchLevel::Step => "step",
            MatchLevel::Arm => "arm",
            MatchLevel::Dose => "dose",
        }
    }
}

/// A step, arm, or dose level that declared a match clause.
#[derive(Debug, Clone)]
pub struct TreatmentNode {
    pub level: MatchLevel,
    pub internal_id: Option<String>,
    pub code: Option<String>,
    pub arm_name: Option<String>,
    pub arm_description: Option<String>,
    /// Level-local suspension flag; forces emitted matches closed.
    pub suspended: bool,
    pub match_tree: MatchTree,
}

/// A validated trial with its match-bearing treatment nodes.
#[derive(Debug, Clone)]
pub struct TrialTree {
    pub trial: Trial,
    pub nodes: Vec<TreatmentNode>,
}

fn id_text(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn suspended(flag: &Option<String>) -> bool {
    flag.as_deref().is_some_and(|f| f.eq_ignore_ascii_case("y"))
}

/// Build the match tree for a treatment node. Only the first clause of
/// the list is evaluated.
fn node_tree(label: &str, clauses: &[Value]) -> Result<Option<MatchTree>> {
    let Some(first) = clauses.first() else {
        return Ok(None);
    };
    if clauses.len() > 1 {
        debug!(trial = label, extra = clauses.len() - 1, "ignoring extra match clauses");
    }
    MatchTree::build(first).map(Some)
}

/// Parse, validate, and attach a match tree to every treatment node that
/// declares one.
pub fn build_trial_tree(doc: &Document) -> Result<TrialTree> {
    let trial = Trial::from_document(doc)?;
    let label = trial.label();
    let mut nodes = Vec::new();

    let steps = trial
        .treatment_list
        .as_ref()
        .map(|t| t.step.as_slice())
        .unwrap_or_default();

    for step in steps {
        if let Some(tree) = node_tree(&label, &step.match_clauses)? {
            nodes.push(TreatmentNode {
                level: MatchLevel::Step,
                internal_id: id_text(&step.step_internal_id),
                code: id_text(&step.step_code),
                arm_name: None,
                arm_description: None,
                suspended: false,
                match_tree: tree,
            });
        }
        for arm in &step.arm {
            if let Some(tree) = node_tree(&label, &arm.match_clauses)? {
                nodes.push(TreatmentNode {
                    level: MatchLevel::Arm,
                    internal_id: id_text(&arm.arm_internal_id),
                    code: id_text(&arm.arm_code),
                    arm_name: id_text(&arm.arm_name),
                    arm_description: id_text(&arm.arm_description),
                    suspended: suspended(&arm.arm_suspended),
                    match_tree: tree,
                });
            }
            for dose in &arm.dose_level {
                if let Some(tree) = node_tree(&label, &dose.match_clauses)? {
                    nodes.push(TreatmentNode {
                        level: MatchLevel::Dose,
                        internal_id: id_text(&dose.level_internal_id),
                        code: id_text(&dose.level_code),
                        arm_name: None,
                        arm_description: None,
                        suspended: suspended(&dose.level_suspended),
                        match_tree: tree,
                    });
                }
            }
        }
    }

    Ok(TrialTree { trial, nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().unwrap().clone()
    }

    fn simple_trial() -> Value {
        json!({
            "protocol_no": "00-001",
            "nct_id": "NCT00000001",
            "_summary": {
                "tumor_types": ["_SOLID_"],
                "coordinating_center": "Dana-Farber Cancer Institute",
                "status": [{"value": "Open to Accrual"}]
            },
            "treatment_list": {
                "step": [{
                    "step_internal_id": 101,
                    "step_code": "1",
                    "arm": [{
                        "arm_internal_id": 201,
                        "arm_code": "A",
                        "arm_suspended": "N",
                        "match": [{"genomic": {"hugo_symbol": "EGFR"}}],
                        "dose_level": [{
                            "level_internal_id": 301,
                            "level_code": "D1",
                            "level_suspended": "Y",
                            "match": [{"and": [
                                {"genomic": {"hugo_symbol": "EGFR", "protein_change": "p.L858R"}},
                                {"clinical": {"age_numerical": ">=18"}}
                            ]}]
                        }]
                    }]
                }]
            }
        })
    }

    #[test]
    fn attaches_match_trees_per_level() {
        let tree = build_trial_tree(&doc(simple_trial())).unwrap();
        assert_eq!(tree.nodes.len(), 2);
        assert_eq!(tree.nodes[0].level, MatchLevel::Arm);
        assert_eq!(tree.nodes[0].internal_id.as_deref(), Some("201"));
        assert!(!tree.nodes[0].suspended);
        assert_eq!(tree.nodes[1].level, MatchLevel::Dose);
        assert_eq!(tree.nodes[1].code.as_deref(), Some("D1"));
        assert!(tree.nodes[1].suspended);
        assert_eq!(tree.nodes[1].match_tree.nodes.len(), 3);
    }

    #[test]
    fn trial_level_helpers() {
        let tree = build_trial_tree(&doc(simple_trial())).unwrap();
        assert_eq!(tree.trial.accrual_status(), TRIAL_STATUS_OPEN);
        assert_eq!(tree.trial.cancer_type_match(), "all_solid");
        assert_eq!(
            tree.trial.coordinating_center(),
            "Dana-Farber Cancer Institute"
        );

        let mut closed = simple_trial();
        closed["_summary"]["status"][0]["value"] = json!("Closed to Accrual");
        let tree = build_trial_tree(&doc(closed)).unwrap();
        assert_eq!(tree.trial.accrual_status(), TRIAL_STATUS_CLOSED);
    }

    #[test]
    fn cancer_type_without_summary_is_unknown() {
        let trial = Trial::default();
        assert_eq!(trial.cancer_type_match(), "unknown");
        assert_eq!(trial.coordinating_center(), "unknown");
    }

    #[test]
    fn missing_identifiers_invalidate_the_trial() {
        let bad = json!({"treatment_list": {"step": []}});
        assert!(matches!(
            build_trial_tree(&doc(bad)),
            Err(EngineError::InvalidTrial(_))
        ));
    }

    #[test]
    fn missing_treatment_list_invalidates_the_trial() {
        let bad = json!({"protocol_no": "00-009"});
        assert!(matches!(
            build_trial_tree(&doc(bad)),
            Err(EngineError::InvalidTrial(_))
        ));
    }

    #[test]
    fn malformed_match_clause_invalidates_the_trial() {
        let mut t = simple_trial();
        t["treatment_list"]["step"][0]["arm"][0]["match"] = json!([{"nand": []}]);
        assert!(matches!(
            build_trial_tree(&doc(t)),
            Err(EngineError::InvalidTrial(_))
        ));
    }
}
