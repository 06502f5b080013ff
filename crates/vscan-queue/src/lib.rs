//! Redis Streams job queue for vscan pipeline runs.
//!
//! Jobs are stored as JSON in a single stream read by a consumer group.
//! Each job holds a dedup marker keyed by video and mode until it is
//! acknowledged or dead-lettered.

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{ProcessVideoJob, QueueJob};
pub use queue::{JobQueue, QueueConfig};
