//! Error types for the log pipeline.
//!
//! Neither error ever reaches the examinee: delivery failures requeue the
//! batch and corrupt snapshots are discarded.

use proctor_storage::StorageKey;

/// A batch could not be delivered to the log sink
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("log sink unreachable: {0}")]
    Unreachable(String),

    #[error("log sink rejected batch of {count} events: {reason}")]
    Rejected { count: usize, reason: String },

    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("log sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("delivery task did not complete: {0}")]
    Aborted(String),
}

/// A durable snapshot could not be decoded on startup
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("corrupt {key} snapshot: {source}")]
    Corrupt {
        key: StorageKey,
        #[source]
        source: serde_json::Error,
    },
}
