//! Embedded in-memory store adapter.
//!
//! Collections are plain vectors of JSON documents behind an RwLock; the
//! typed predicate is evaluated document by document. Good for the test
//! suites and for single-process runs on bounded snapshots.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::predicate::{Document, Predicate};
use crate::store::Store;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Vec<Document>>>>,
    indexes: Arc<RwLock<HashMap<String, Vec<Vec<String>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn project(doc: &Document, projection: Option<&[&str]>) -> Document {
        match projection {
            None => doc.clone(),
            Some(fields) => {
                let mut out = Document::new();
                for f in fields {
                    if let Some(v) = doc.get(*f) {
                        out.insert((*f).to_string(), v.clone());
                    }
                }
                out
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Predicate,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Document>> {
        let guard = self.inner.read().expect("store lock poisoned");
        let Some(docs) = guard.get(collection) else {
            return Ok(vec![]);
        };
        let mut out = Vec::new();
        for doc in docs {
            if filter.matches(doc)? {
                out.push(Self::project(doc, projection));
            }
        }
        Ok(out)
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: &Predicate,
    ) -> Result<Vec<Value>> {
        let guard = self.inner.read().expect("store lock poisoned");
        let Some(docs) = guard.get(collection) else {
            return Ok(vec![]);
        };
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for doc in docs {
            if !filter.matches(doc)? {
                continue;
            }
            if let Some(v) = doc.get(field).filter(|v| !v.is_null()) {
                if seen.insert(v.to_string()) {
                    out.push(v.clone());
                }
            }
        }
        Ok(out)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<usize> {
        let mut guard = self.inner.write().expect("store lock poisoned");
        let n = docs.len();
        guard.entry(collection.to_string()).or_default().extend(docs);
        Ok(n)
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let mut guard = self.inner.write().expect("store lock poisoned");
        guard.remove(collection);
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let guard = self.inner.read().expect("store lock poisoned");
        Ok(guard.get(collection).map(|d| d.len() as u64).unwrap_or(0))
    }

    async fn ensure_index(&self, collection: &str, fields: &[&str]) -> Result<()> {
        // Scans are linear here; the declaration is kept so adapters with
        // real indexes can be swapped in without touching callers.
        let mut guard = self.indexes.write().expect("store lock poisoned");
        guard
            .entry(collection.to_string())
            .or_default()
            .push(fields.iter().map(|f| f.to_string()).collect());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::FieldCond;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn find_with_projection() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "genomic",
                vec![
                    doc(json!({"sample_id": "S1", "true_hugo_symbol": "EGFR", "tier": 1})),
                    doc(json!({"sample_id": "S2", "true_hugo_symbol": "BRAF", "tier": 2})),
                ],
            )
            .await
            .unwrap();

        let filter = Predicate::field("true_hugo_symbol", FieldCond::Eq(json!("EGFR")));
        let rows = store
            .find("genomic", &filter, Some(&["sample_id"]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["sample_id"], "S1");
        assert!(rows[0].get("tier").is_none());
    }

    #[tokio::test]
    async fn distinct_dedupes() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "clinical",
                vec![
                    doc(json!({"sample_id": "S1"})),
                    doc(json!({"sample_id": "S1"})),
                    doc(json!({"sample_id": "S2"})),
                ],
            )
            .await
            .unwrap();
        let vals = store
            .distinct("clinical", "sample_id", &Predicate::True)
            .await
            .unwrap();
        assert_eq!(vals.len(), 2);
    }

    #[tokio::test]
    async fn drop_then_count() {
        let store = MemoryStore::new();
        store
            .insert_many("trial_match", vec![doc(json!({"sample_id": "S1"}))])
            .await
            .unwrap();
        assert_eq!(store.count("trial_match").await.unwrap(), 1);
        store.drop_collection("trial_match").await.unwrap();
        assert_eq!(store.count("trial_match").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_on_missing_collection_is_empty() {
        let store = MemoryStore::new();
        let rows = store.find("nope", &Predicate::True, None).await.unwrap();
        assert!(rows.is_empty());
    }
}
