//! Run orchestration.
//!
//! One `MatchEngine` owns a read-only snapshot view: the population
//! (`all_samples`, sample → mrn), the tumor taxonomy, and the store
//! handle. `find_trial_matches` fans (trial, match-tree) units out over a
//! bounded worker pool, sorts the surviving matches, and rewrites the
//! trial_match collection.

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::annotate::{AnnotationClient, AnnotationIndex};
use crate::emit::emit_matches;
use crate::error::{EngineError, Result};
use crate::oncotree::Oncotree;
use crate::query::QueryEvaluator;
use crate::sort::add_sort_order;
use crate::traverse::evaluate_tree;
use crate::trial::{build_trial_tree, TrialTree};
use oncomatch_common::{MatchConfig, MatchMethod, TrialMatch};
use oncomatch_store::{
    Predicate, Store, COLLECTION_CLINICAL, COLLECTION_GENOMIC, COLLECTION_TRIAL,
    COLLECTION_TRIAL_MATCH,
};

pub struct MatchEngine {
    store: Arc<dyn Store>,
    config: MatchConfig,
    oncotree: Arc<Oncotree>,
    all_samples: Arc<HashSet<String>>,
    mrn_map: Arc<HashMap<String, String>>,
    today: NaiveDate,
    cancel: CancellationToken,
}

impl MatchEngine {
    /// Snapshot the population once; the sets stay fixed for the run.
    pub async fn new(
        store: Arc<dyn Store>,
        config: MatchConfig,
        oncotree: Oncotree,
    ) -> Result<Self> {
        store
            .ensure_index(COLLECTION_CLINICAL, &["sample_id"])
            .await?;
        store
            .ensure_index(COLLECTION_GENOMIC, &["true_hugo_symbol", "wildtype"])
            .await?;

        let rows = store
            .find(
                COLLECTION_CLINICAL,
                &Predicate::True,
                Some(&["sample_id", "mrn"]),
            )
            .await?;
        let mut all_samples = HashSet::new();
        let mut mrn_map = HashMap::new();
        for row in rows {
            let Some(sample_id) = row.get("sample_id").and_then(Value::as_str) else {
                continue;
            };
            all_samples.insert(sample_id.to_string());
            if let Some(mrn) = row.get("mrn").and_then(Value::as_str) {
                mrn_map.insert(sample_id.to_string(), mrn.to_string());
            }
        }
        info!(samples = all_samples.len(), "population snapshot taken");

        Ok(Self {
            store,
            config,
            oncotree: Arc::new(oncotree),
            all_samples: Arc::new(all_samples),
            mrn_map: Arc::new(mrn_map),
            today: Utc::now().date_naive(),
            cancel: CancellationToken::new(),
        })
    }

    /// Pin "today" for age translation; tests and replays need this.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Token that aborts the run between trees and between leaves.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Evaluate every match tree of every trial, sort, and rewrite the
    /// trial_match collection.
    #[instrument(skip(self))]
    pub async fn find_trial_matches(&self) -> Result<Vec<TrialMatch>> {
        let trial_docs = self
            .store
            .find(COLLECTION_TRIAL, &Predicate::True, None)
            .await?;

        let mut trees: Vec<Arc<TrialTree>> = Vec::new();
        for doc in &trial_docs {
            match build_trial_tree(doc) {
                Ok(tree) => trees.push(Arc::new(tree)),
                Err(e) => warn!(error = %e, "skipping invalid trial"),
            }
        }
        info!(
            trials = trees.len(),
            skipped = trial_docs.len() - trees.len(),
            "trial catalog loaded"
        );

        let annotation = self.build_annotation_index(&trees).await;

        let evaluator = QueryEvaluator {
            store: Arc::clone(&self.store),
            all_samples: Arc::clone(&self.all_samples),
            oncotree: Arc::clone(&self.oncotree),
            annotation,
            today: self.today,
        };

        let units: Vec<(Arc<TrialTree>, usize)> = trees
            .iter()
            .flat_map(|tree| (0..tree.nodes.len()).map(move |i| (Arc::clone(tree), i)))
            .collect();

        let results: Vec<Vec<TrialMatch>> = stream::iter(units.into_iter().map(|(tree, index)| {
            let evaluator = evaluator.clone();
            let store = Arc::clone(&self.store);
            let mrn_map = Arc::clone(&self.mrn_map);
            let cancel = self.cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let node = &tree.nodes[index];
                info!(
                    trial = %tree.trial.label(),
                    level = node.level.as_str(),
                    "matching treatment node"
                );
                let evidence = evaluate_tree(&node.match_tree, &evaluator, &cancel).await?;
                emit_matches(store.as_ref(), &evidence, &mrn_map, &tree.trial, node).await
            }
        }))
        .buffer_unordered(self.config.worker_count)
        .try_collect()
        .await?;

        let mut matches: Vec<TrialMatch> = results.into_iter().flatten().collect();
        info!(matches = matches.len(), "evaluation finished, sorting");
        add_sort_order(&mut matches);

        // Evaluation order is nondeterministic; the output order is not.
        matches.sort_by(|a, b| {
            a.sample_id
                .cmp(&b.sample_id)
                .then_with(|| a.sort_order.cmp(&b.sort_order))
                .then_with(|| a.protocol_no.cmp(&b.protocol_no))
                .then_with(|| a.match_level.cmp(&b.match_level))
                .then_with(|| a.internal_id.cmp(&b.internal_id))
                .then_with(|| a.genomic_alteration.cmp(&b.genomic_alteration))
        });

        self.write_matches(&matches).await?;
        Ok(matches)
    }

    /// Build the annotation index when configured; any failure degrades
    /// the run to the general matcher.
    async fn build_annotation_index(
        &self,
        trees: &[Arc<TrialTree>],
    ) -> Option<Arc<AnnotationIndex>> {
        if self.config.match_method != MatchMethod::Annotated {
            return None;
        }
        let (Some(endpoint), Some(token)) = (
            self.config.annotation_endpoint.as_ref(),
            self.config.annotation_token.as_ref(),
        ) else {
            warn!("annotated matching configured without endpoint/token, using general matcher");
            return None;
        };

        let result = match AnnotationClient::new(endpoint.clone(), token.clone()) {
            Ok(client) => client.build_index(self.store.as_ref(), trees).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(index) => Some(Arc::new(index)),
            Err(e) => {
                warn!(error = %e, "annotation service unavailable, using general matcher");
                None
            }
        }
    }

    /// Truncate-then-insert, batched; never concurrent with evaluation.
    async fn write_matches(&self, matches: &[TrialMatch]) -> Result<()> {
        self.store.drop_collection(COLLECTION_TRIAL_MATCH).await?;
        for chunk in matches.chunks(self.config.batch_size.max(1)) {
            let docs = chunk.iter().map(TrialMatch::to_document).collect();
            self.store.insert_many(COLLECTION_TRIAL_MATCH, docs).await?;
        }
        info!(written = matches.len(), "trial_match collection rewritten");
        Ok(())
    }
}
