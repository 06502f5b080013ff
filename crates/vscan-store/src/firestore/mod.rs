//! Firestore REST backend.

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use retry::RetryConfig;
pub use store::FirestoreRecordStore;
pub use token_cache::{TokenCache, TokenSource};
pub use types::{Document, Value};
