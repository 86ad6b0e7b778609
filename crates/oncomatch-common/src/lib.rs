//! oncomatch-common — Shared record types, errors, and configuration used
//! across all Oncomatch crates.

pub mod config;
pub mod entities;
pub mod error;

pub use config::{MatchConfig, MatchMethod};
pub use entities::{ClinicalRecord, GenomicRecord, TrialMatch};
pub use error::{CommonError, Result};
