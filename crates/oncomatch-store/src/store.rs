//! The `Store` trait: the surface the matching core talks to.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::predicate::{Document, Predicate};

pub const COLLECTION_CLINICAL: &str = "clinical";
pub const COLLECTION_GENOMIC: &str = "genomic";
pub const COLLECTION_TRIAL: &str = "trial";
pub const COLLECTION_TRIAL_MATCH: &str = "trial_match";

/// A document store holding the patient snapshot, the trial catalog, and
/// the output collection. Implementations must tolerate concurrent reads;
/// the engine only writes after evaluation has finished.
#[async_trait]
pub trait Store: Send + Sync {
    /// Filtered find. `projection` lists the fields to return; `None`
    /// returns whole documents.
    async fn find(
        &self,
        collection: &str,
        filter: &Predicate,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Document>>;

    /// Distinct values of `field` over documents matching `filter`.
    async fn distinct(&self, collection: &str, field: &str, filter: &Predicate)
        -> Result<Vec<Value>>;

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<usize>;

    async fn drop_collection(&self, collection: &str) -> Result<()>;

    async fn count(&self, collection: &str) -> Result<u64>;

    /// Declare an index over `fields`. Adapters without secondary indexes
    /// may treat this as a hint.
    async fn ensure_index(&self, collection: &str, fields: &[&str]) -> Result<()>;
}
