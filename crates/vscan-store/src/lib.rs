//! Record persistence for the vscan pipeline.
//!
//! This crate provides:
//! - The `RecordStore` trait with dotted-path partial updates
//! - A Firestore REST backend (service account auth, retries, metrics)
//! - An in-memory backend for local runs and tests

pub mod error;
pub mod firestore;
pub mod memory;
pub mod record_store;

pub use error::{StoreError, StoreResult};
pub use firestore::{FirestoreClient, FirestoreConfig, FirestoreError, FirestoreRecordStore};
pub use memory::MemoryRecordStore;
pub use record_store::{FieldUpdates, RecordStore};
