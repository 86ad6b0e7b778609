//! Snapshot loader.
//!
//! Thin ingestion of clinical/genomic CSV or JSON files and trial
//! YAML/JSON documents into the store. Responsibilities are deliberately
//! small: normalize date fields to ISO `YYYY-MM-DD`, cast the handful of
//! numeric genomic columns, assign document ids, and link each genomic
//! row to its clinical document through `sample_id`.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::predicate::{Document, Predicate};
use crate::store::{Store, COLLECTION_CLINICAL, COLLECTION_GENOMIC, COLLECTION_TRIAL};
use oncomatch_common::{ClinicalRecord, GenomicRecord};

const DATE_FIELDS: &[&str] = &["birth_date", "report_date"];
const INT_FIELDS: &[&str] = &["true_transcript_exon", "position", "tier"];
const FLOAT_FIELDS: &[&str] = &["allele_fraction"];
const BOOL_FIELDS: &[&str] = &["wildtype"];

/// Parse the date formats seen in exports into `YYYY-MM-DD`. Trailing
/// time components are dropped.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(date_part, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    None
}

fn normalize_dates_in_place(doc: &mut Document) {
    for field in DATE_FIELDS {
        let Some(Value::String(raw)) = doc.get(*field) else {
            continue;
        };
        match normalize_date(raw) {
            Some(iso) => {
                doc.insert((*field).to_string(), Value::String(iso));
            }
            None => {
                // Kept verbatim; age criteria will skip this patient.
                warn!(field = *field, value = %raw, "unparseable date kept unchanged");
            }
        }
    }
}

fn cast_genomic_fields(doc: &mut Document) {
    for field in INT_FIELDS {
        if let Some(Value::String(s)) = doc.get(*field) {
            if let Ok(n) = s.trim().parse::<i64>() {
                doc.insert((*field).to_string(), Value::from(n));
            }
        }
    }
    for field in FLOAT_FIELDS {
        if let Some(Value::String(s)) = doc.get(*field) {
            if let Ok(n) = s.trim().parse::<f64>() {
                doc.insert((*field).to_string(), Value::from(n));
            }
        }
    }
    for field in BOOL_FIELDS {
        if let Some(Value::String(s)) = doc.get(*field) {
            match s.trim().to_lowercase().as_str() {
                "true" => {
                    doc.insert((*field).to_string(), Value::Bool(true));
                }
                "false" => {
                    doc.insert((*field).to_string(), Value::Bool(false));
                }
                _ => {}
            }
        }
    }
}

fn read_csv(path: &Path) -> Result<Vec<Document>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut docs = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut doc = Document::new();
        for (header, raw) in headers.iter().zip(record.iter()) {
            if raw.is_empty() {
                continue;
            }
            doc.insert(header.clone(), Value::String(raw.to_string()));
        }
        docs.push(doc);
    }
    Ok(docs)
}

fn read_json_array(path: &Path) -> Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;
    let Value::Array(items) = value else {
        return Err(StoreError::InvalidQuery(format!(
            "{}: expected a JSON array of documents",
            path.display()
        )));
    };
    let mut docs = Vec::new();
    for item in items {
        match item {
            Value::Object(mut map) => {
                let lowered: Document = map
                    .iter_mut()
                    .map(|(k, v)| (k.to_lowercase(), v.take()))
                    .collect();
                docs.push(lowered);
            }
            other => {
                warn!(?other, "skipping non-object entry in JSON snapshot");
            }
        }
    }
    Ok(docs)
}

fn read_snapshot(path: &Path) -> Result<Vec<Document>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => read_json_array(path),
        _ => read_csv(path),
    }
}

/// Parse into the typed record to catch rows missing identity fields or
/// carrying mistyped values; invalid rows are skipped with a warning.
fn validate_row<T: serde::de::DeserializeOwned>(doc: &Document, kind: &str) -> bool {
    match serde_json::from_value::<T>(Value::Object(doc.clone())) {
        Ok(_) => true,
        Err(e) => {
            warn!(kind, error = %e, "skipping invalid snapshot row");
            false
        }
    }
}

/// Load the clinical snapshot. Returns the number of documents inserted.
pub async fn load_clinical(store: &dyn Store, path: impl AsRef<Path>) -> Result<usize> {
    let mut docs = read_snapshot(path.as_ref())?;
    for doc in &mut docs {
        normalize_dates_in_place(doc);
        doc.entry("_id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    }
    docs.retain(|d| validate_row::<ClinicalRecord>(d, "clinical"));
    let n = store.insert_many(COLLECTION_CLINICAL, docs).await?;
    store
        .ensure_index(COLLECTION_CLINICAL, &["sample_id"])
        .await?;
    info!(n, "clinical documents loaded");
    Ok(n)
}

/// Load the genomic snapshot, linking each row to its clinical document.
pub async fn load_genomic(store: &dyn Store, path: impl AsRef<Path>) -> Result<usize> {
    let clinical = store
        .find(
            COLLECTION_CLINICAL,
            &Predicate::True,
            Some(&["sample_id", "_id"]),
        )
        .await?;
    let mut clinical_ids: HashMap<String, String> = HashMap::new();
    for doc in &clinical {
        if let (Some(sid), Some(cid)) = (
            doc.get("sample_id").and_then(Value::as_str),
            doc.get("_id").and_then(Value::as_str),
        ) {
            clinical_ids.insert(sid.to_string(), cid.to_string());
        }
    }

    let mut docs = read_snapshot(path.as_ref())?;
    for doc in &mut docs {
        cast_genomic_fields(doc);
        doc.entry("_id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        if let Some(sid) = doc.get("sample_id").and_then(Value::as_str) {
            if let Some(cid) = clinical_ids.get(sid) {
                doc.insert("clinical_id".to_string(), Value::String(cid.clone()));
            }
        }
    }
    docs.retain(|d| validate_row::<GenomicRecord>(d, "genomic"));
    let n = store.insert_many(COLLECTION_GENOMIC, docs).await?;
    store
        .ensure_index(COLLECTION_GENOMIC, &["true_hugo_symbol", "wildtype"])
        .await?;
    info!(n, "genomic documents loaded");
    Ok(n)
}

/// Load every trial declaration (.yml/.yaml/.json) in a directory, or a
/// single file. Returns the number of trials inserted.
pub async fn load_trials(store: &dyn Store, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let mut files = Vec::new();
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let p = entry?.path();
            if matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yml" | "yaml" | "json")
            ) {
                files.push(p);
            }
        }
        files.sort();
    } else {
        files.push(path.to_path_buf());
    }

    let mut docs = Vec::new();
    for file in files {
        let raw = std::fs::read_to_string(&file)?;
        let value: Value = if file.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&raw)?
        } else {
            serde_yaml::from_str(&raw)?
        };
        match value {
            Value::Object(map) => docs.push(map),
            _ => warn!(file = %file.display(), "trial file is not a mapping, skipped"),
        }
    }
    let n = store.insert_many(COLLECTION_TRIAL, docs).await?;
    info!(n, "trials loaded");
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::io::Write;

    #[test]
    fn normalizes_common_date_formats() {
        assert_eq!(normalize_date("1997-11-03"), Some("1997-11-03".into()));
        assert_eq!(
            normalize_date("1997-11-03 00:00:00"),
            Some("1997-11-03".into())
        );
        assert_eq!(normalize_date("11/03/1997"), Some("1997-11-03".into()));
        assert_eq!(normalize_date("third of november"), None);
    }

    #[tokio::test]
    async fn loads_csv_and_links_clinical_ids() {
        let store = MemoryStore::new();

        let mut clinical = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(clinical, "SAMPLE_ID,MRN,BIRTH_DATE,ONCOTREE_PRIMARY_DIAGNOSIS_NAME").unwrap();
        writeln!(clinical, "S1,P1,1997-11-03 00:00:00,Melanoma").unwrap();
        writeln!(clinical, "S2,P2,not-a-date,Glioblastoma").unwrap();
        clinical.flush().unwrap();

        let mut genomic = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(genomic, "SAMPLE_ID,TRUE_HUGO_SYMBOL,TRUE_TRANSCRIPT_EXON,WILDTYPE").unwrap();
        writeln!(genomic, "S1,EGFR,19,false").unwrap();
        genomic.flush().unwrap();

        assert_eq!(load_clinical(&store, clinical.path()).await.unwrap(), 2);
        assert_eq!(load_genomic(&store, genomic.path()).await.unwrap(), 1);

        let rows = store
            .find(COLLECTION_CLINICAL, &Predicate::True, None)
            .await
            .unwrap();
        assert_eq!(rows[0]["birth_date"], "1997-11-03");
        // malformed date survives untouched
        assert_eq!(rows[1]["birth_date"], "not-a-date");

        let g = store
            .find(COLLECTION_GENOMIC, &Predicate::True, None)
            .await
            .unwrap();
        assert_eq!(g[0]["true_transcript_exon"], 19);
        assert_eq!(g[0]["wildtype"], false);
        assert_eq!(g[0]["clinical_id"], rows[0]["_id"]);
    }

    #[tokio::test]
    async fn rows_without_identity_fields_are_skipped() {
        let store = MemoryStore::new();
        let mut clinical = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(clinical, "SAMPLE_ID,MRN,GENDER").unwrap();
        writeln!(clinical, "S1,P1,Female").unwrap();
        writeln!(clinical, ",P2,Male").unwrap(); // no sample id
        clinical.flush().unwrap();

        assert_eq!(load_clinical(&store, clinical.path()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn loads_trial_yaml() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("00-001.yml"),
            "protocol_no: '00-001'\ntreatment_list:\n  step: []\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(load_trials(&store, dir.path()).await.unwrap(), 1);
        let t = store
            .find(COLLECTION_TRIAL, &Predicate::True, None)
            .await
            .unwrap();
        assert_eq!(t[0]["protocol_no"], "00-001");
    }
}
