//! Key/value persistence used by the log pipeline and the supervisor.

use anyhow::Result;

/// Logical keys held in durable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Events not yet confirmed by the sink, overwritten at every
    /// record/flush boundary
    PendingQueue,
    /// Every event ever recorded, append-only
    SessionHistory,
    /// Last known supervisor state
    SessionState,
}

impl StorageKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingQueue => "pending_queue",
            Self::SessionHistory => "session_history",
            Self::SessionState => "session_state",
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable key/value store holding JSON documents
pub trait DurableStore: Send + Sync {
    /// Read the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read
    fn load(&self, key: StorageKey) -> Result<Option<String>>;

    /// Overwrite the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write
    fn save(&self, key: StorageKey, value: &str) -> Result<()>;
}
