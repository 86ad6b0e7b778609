//! Configuration loading for Oncomatch.
//! Reads oncomatch.toml from the current directory or the path in the
//! ONCOMATCH_CONFIG env var; individual settings can be overridden via
//! ONCOMATCH_* environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CommonError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Field-by-field criteria matching only.
    General,
    /// General matching constrained by the annotation-service index.
    Annotated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    #[serde(default = "default_store_uri")]
    pub store_uri: String,
    /// Parallel (trial, match-tree) evaluations.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_match_method")]
    pub match_method: MatchMethod,
    /// Endpoint of the optional variant annotation service.
    #[serde(default)]
    pub annotation_endpoint: Option<String>,
    /// Required whenever `annotation_endpoint` is set.
    #[serde(default)]
    pub annotation_token: Option<String>,
    /// Tab-separated tumor taxonomy, or a .json diagnosis→descendants map.
    #[serde(default = "default_tumor_tree_path")]
    pub tumor_tree_path: String,
    /// trial_match insert batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_store_uri() -> String {
    "memory://oncomatch".to_string()
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(1)
}

fn default_match_method() -> MatchMethod {
    MatchMethod::General
}

fn default_tumor_tree_path() -> String {
    "data/tumor_tree.txt".to_string()
}

fn default_batch_size() -> usize {
    1000
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            store_uri: default_store_uri(),
            worker_count: default_worker_count(),
            match_method: default_match_method(),
            annotation_endpoint: None,
            annotation_token: None,
            tumor_tree_path: default_tumor_tree_path(),
            batch_size: default_batch_size(),
        }
    }
}

impl MatchConfig {
    /// Load from oncomatch.toml (or $ONCOMATCH_CONFIG), then apply env
    /// overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("ONCOMATCH_CONFIG").unwrap_or_else(|_| "oncomatch.toml".into());
        let mut cfg = if Path::new(&path).exists() {
            Self::from_path(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ONCOMATCH_STORE_URI") {
            self.store_uri = v;
        }
        if let Ok(v) = std::env::var("ONCOMATCH_WORKER_COUNT") {
            if let Ok(n) = v.parse() {
                self.worker_count = n;
            }
        }
        if let Ok(v) = std::env::var("ONCOMATCH_ANNOTATION_ENDPOINT") {
            self.annotation_endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("ONCOMATCH_ANNOTATION_TOKEN") {
            self.annotation_token = Some(v);
        }
        if let Ok(v) = std::env::var("ONCOMATCH_TUMOR_TREE") {
            self.tumor_tree_path = v;
        }
        if let Ok(v) = std::env::var("ONCOMATCH_MATCH_METHOD") {
            match v.to_lowercase().as_str() {
                "general" => self.match_method = MatchMethod::General,
                "annotated" => self.match_method = MatchMethod::Annotated,
                other => tracing::warn!(method = other, "unrecognized ONCOMATCH_MATCH_METHOD"),
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(CommonError::Config("worker_count must be > 0".into()));
        }
        if self.annotation_endpoint.is_some() && self.annotation_token.is_none() {
            return Err(CommonError::Config(
                "annotation_token is required when annotation_endpoint is set".into(),
            ));
        }
        Ok(())
    }
}
