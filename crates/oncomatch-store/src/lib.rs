//! Oncomatch document store layer.
//!
//! The matching core never builds store-native queries; it assembles a
//! typed [`Predicate`] which each adapter renders into its own query form.
//! The only adapter shipped here is an embedded in-memory store, which is
//! also what the test suites run against.

pub mod error;
pub mod loader;
pub mod memory;
pub mod predicate;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use predicate::{Document, FieldCond, Predicate};
pub use store::{
    Store, COLLECTION_CLINICAL, COLLECTION_GENOMIC, COLLECTION_TRIAL, COLLECTION_TRIAL_MATCH,
};
