//! oncomatch-engine — the patient/trial matching core.
//!
//! A trial's eligibility declaration (a boolean tree of clinical and
//! genomic criteria) is compiled into store predicates, evaluated against
//! the patient snapshot with proper and/or set semantics and negation,
//! and turned into sorted, annotated match records.
//!
//! Pipeline: [`trial`] builds trial trees → [`matchtree`] parses each
//! match clause → [`criteria`] compiles leaves (via [`normalize`],
//! [`age`], [`oncotree`]) → [`query`]/[`traverse`] evaluate →
//! [`emit`] produces records → [`sort`] orders them. [`engine`] wires the
//! whole run together; [`annotate`] is the optional annotation-service
//! client.

pub mod age;
pub mod alteration;
pub mod annotate;
pub mod criteria;
pub mod emit;
pub mod engine;
pub mod error;
pub mod matchtree;
pub mod normalize;
pub mod oncotree;
pub mod query;
pub mod sort;
pub mod traverse;
pub mod trial;

pub use annotate::{AnnotationClient, AnnotationIndex};
pub use engine::MatchEngine;
pub use error::{EngineError, Result};
pub use matchtree::MatchTree;
pub use oncotree::Oncotree;
pub use query::{Evidence, QueryEvaluator};
pub use trial::{build_trial_tree, Trial, TrialTree};
