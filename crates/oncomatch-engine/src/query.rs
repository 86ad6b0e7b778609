//! Leaf query execution.
//!
//! Compiled criteria run against the store here. Negative genomic leaves
//! execute their underlying positive filter and take the complement over
//! `all_samples`; positive leaves project every field the emitted match
//! needs so the alteration can be reconstructed without a second query.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::alteration;
use crate::annotate::AnnotationIndex;
use crate::criteria::{
    self, ClinicalCriteria, CompiledGenomic, GenomicCriteria,
};
use crate::error::Result;
use crate::oncotree::Oncotree;
use oncomatch_store::{
    Document, FieldCond, Predicate, Store, COLLECTION_CLINICAL, COLLECTION_GENOMIC,
};

/// Fields projected for every positive genomic match; everything the
/// match record carries downstream.
pub const GENOMIC_PROJECTION: &[&str] = &[
    "sample_id",
    "true_hugo_symbol",
    "true_protein_change",
    "true_variant_classification",
    "variant_category",
    "cnv_call",
    "wildtype",
    "chromosome",
    "position",
    "true_cdna_change",
    "reference_allele",
    "true_transcript_exon",
    "canonical_strand",
    "allele_fraction",
    "tier",
    "clinical_id",
    "mmr_status",
    "actionability",
    "_id",
];

const ANNOTATED_PROJECTION: &[&str] = &[
    "sample_id",
    "true_hugo_symbol",
    "true_protein_change",
    "true_variant_classification",
    "variant_category",
    "annotated_variant",
    "_id",
];

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Per-sample proof of why a leaf matched.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub sample_id: String,
    pub clinical_only: bool,
    pub match_type: Option<String>,
    pub genomic_alteration: String,
    /// Projected genomic fields (with `_id` renamed to `genomic_id`).
    pub payload: Document,
}

impl Evidence {
    pub fn clinical_only(sample_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            clinical_only: true,
            match_type: None,
            genomic_alteration: "None".into(),
            payload: Document::new(),
        }
    }

    /// Two evidence records with identical payloads collapse to one.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.sample_id,
            self.clinical_only,
            self.match_type.as_deref().unwrap_or(""),
            self.genomic_alteration,
            Value::Object(self.payload.clone())
        )
    }
}

/// Shared, read-only context for evaluating leaves.
#[derive(Clone)]
pub struct QueryEvaluator {
    pub store: Arc<dyn Store>,
    pub all_samples: Arc<HashSet<String>>,
    pub oncotree: Arc<Oncotree>,
    pub annotation: Option<Arc<AnnotationIndex>>,
    pub today: chrono::NaiveDate,
}

impl QueryEvaluator {
    async fn find_retry(
        &self,
        collection: &str,
        filter: &Predicate,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Document>> {
        let mut attempt = 0;
        loop {
            match self.store.find(collection, filter, projection).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_transient() && attempt + 1 < RETRY_ATTEMPTS => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(collection, attempt, error = %e, "store query failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Distinct sample_id set matching a clinical leaf.
    pub async fn eval_clinical(&self, crit: &ClinicalCriteria) -> Result<HashSet<String>> {
        let compiled = criteria::compile_clinical(crit, &self.oncotree, self.today);
        let Some(filter) = compiled.filter else {
            warn!(?crit, "clinical leaf has no usable criteria, matches nothing");
            return Ok(HashSet::new());
        };
        let rows = self
            .find_retry(COLLECTION_CLINICAL, &filter, Some(&["sample_id"]))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("sample_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Matched sample set and per-sample evidence for a genomic leaf.
    pub async fn eval_genomic(
        &self,
        crit: &GenomicCriteria,
    ) -> Result<(HashSet<String>, Vec<Evidence>)> {
        let general = if crit.wants_general() {
            Some(self.general_match(crit).await?)
        } else {
            None
        };
        let annotated = if crit.wants_annotated() && self.annotation.is_some() {
            Some(self.annotated_match(crit).await?)
        } else {
            None
        };

        // When both matchers fire, the annotated result constrains the
        // general one; otherwise whichever fired wins.
        Ok(match (general, annotated) {
            (Some((gen_ids, _)), Some((ann_ids, ann_evidence))) => {
                let ids: HashSet<String> = gen_ids.intersection(&ann_ids).cloned().collect();
                let evidence = ann_evidence
                    .into_iter()
                    .filter(|e| ids.contains(&e.sample_id))
                    .collect();
                (ids, evidence)
            }
            (Some(general), None) => general,
            (None, Some(annotated)) => annotated,
            (None, None) => {
                warn!(?crit, "genomic leaf has no applicable matcher, matches nothing");
                (HashSet::new(), vec![])
            }
        })
    }

    async fn general_match(
        &self,
        crit: &GenomicCriteria,
    ) -> Result<(HashSet<String>, Vec<Evidence>)> {
        let compiled: CompiledGenomic = criteria::compile_genomic(crit);
        let Some(filter) = &compiled.filter else {
            warn!(?crit, "genomic leaf compiled to nothing, matches nothing");
            return Ok((HashSet::new(), vec![]));
        };

        if compiled.negative {
            // Run the positive query, then complement over the population.
            let rows = self
                .find_retry(COLLECTION_GENOMIC, filter, Some(&["sample_id"]))
                .await?;
            let positive: HashSet<String> = rows
                .iter()
                .filter_map(|r| r.get("sample_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            let matched: HashSet<String> = self
                .all_samples
                .difference(&positive)
                .cloned()
                .collect();
            let (alteration, match_type) = alteration::format_negative(&compiled.shape);
            let evidence = matched
                .iter()
                .map(|sample_id| Evidence {
                    sample_id: sample_id.clone(),
                    clinical_only: false,
                    match_type: Some(match_type.to_string()),
                    genomic_alteration: alteration.clone(),
                    payload: Document::new(),
                })
                .collect();
            return Ok((matched, evidence));
        }

        let mut projection: Vec<&str> = GENOMIC_PROJECTION.to_vec();
        if compiled.is_sv {
            // keep the pathologist comment for downstream manual review
            projection.push("structural_variant_comment");
        }
        let rows = self
            .find_retry(COLLECTION_GENOMIC, filter, Some(&projection))
            .await?;

        let mut matched = HashSet::new();
        let mut evidence = Vec::new();
        for row in rows {
            let Some(sample_id) = row.get("sample_id").and_then(Value::as_str) else {
                debug!("genomic row without sample_id skipped");
                continue;
            };
            let (genomic_alteration, match_type) =
                alteration::format_alteration(&row, &compiled.shape);
            matched.insert(sample_id.to_string());
            evidence.push(Evidence {
                sample_id: sample_id.to_string(),
                clinical_only: false,
                match_type: Some(match_type.to_string()),
                genomic_alteration,
                payload: rename_id(row),
            });
        }
        Ok((matched, evidence))
    }

    async fn annotated_match(
        &self,
        crit: &GenomicCriteria,
    ) -> Result<(HashSet<String>, Vec<Evidence>)> {
        let index = self
            .annotation
            .as_ref()
            .expect("annotated_match called without an index");

        let mut negative = false;
        let gene = strip(crit.hugo_symbol.as_deref().unwrap_or(""), &mut negative);
        let declared = strip(
            crit.annotated_variant.as_deref().unwrap_or(""),
            &mut negative,
        );

        let mut rows: Vec<Document> = Vec::new();
        for protein_change in index.changes_matching(&gene, &declared) {
            let filter = Predicate::And(vec![
                Predicate::field("true_hugo_symbol", FieldCond::Eq(Value::from(gene.clone()))),
                Predicate::field(
                    "true_protein_change",
                    FieldCond::Eq(Value::from(protein_change)),
                ),
            ]);
            rows.extend(
                self.find_retry(COLLECTION_GENOMIC, &filter, Some(ANNOTATED_PROJECTION))
                    .await?,
            );
        }

        if negative {
            let positive: HashSet<String> = rows
                .iter()
                .filter_map(|r| r.get("sample_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            let matched: HashSet<String> = self
                .all_samples
                .difference(&positive)
                .cloned()
                .collect();
            let evidence = matched
                .iter()
                .map(|sample_id| {
                    let mut payload = Document::new();
                    payload.insert(
                        "annotated_variant".into(),
                        Value::from(format!("!{declared}")),
                    );
                    Evidence {
                        sample_id: sample_id.clone(),
                        clinical_only: false,
                        match_type: Some("annotated_variant".into()),
                        genomic_alteration: format!("!{gene} !{declared}"),
                        payload,
                    }
                })
                .collect();
            return Ok((matched, evidence));
        }

        let mut matched = HashSet::new();
        let mut evidence = Vec::new();
        for row in rows {
            let Some(sample_id) = row.get("sample_id").and_then(Value::as_str) else {
                continue;
            };
            let sample_id = sample_id.to_string();
            matched.insert(sample_id.clone());
            let mut payload = rename_id(row);
            payload.insert("annotated_variant".into(), Value::from(declared.clone()));
            evidence.push(Evidence {
                sample_id,
                clinical_only: false,
                match_type: Some("annotated_variant".into()),
                genomic_alteration: format!("{gene} {declared}"),
                payload,
            });
        }
        Ok((matched, evidence))
    }
}

fn strip(raw: &str, negative: &mut bool) -> String {
    match raw.strip_prefix('!') {
        Some(rest) => {
            *negative = true;
            rest.to_string()
        }
        None => raw.to_string(),
    }
}

fn rename_id(mut row: Document) -> Document {
    if let Some(id) = row.remove("_id") {
        row.insert("genomic_id".into(), id);
    }
    row
}
