use async_trait::async_trait;
use proctor_storage::SecurityEvent;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::SinkError;

/// Remote endpoint that accepts batches of security events
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver a whole batch. There is no partial acknowledgement: the
    /// batch either succeeds or is retried whole.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch was not accepted
    async fn deliver(&self, batch: &[SecurityEvent]) -> Result<(), SinkError>;

    fn name(&self) -> &'static str;
}

/// Spools delivered batches to a JSON-lines outbox file
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSink for FileSink {
    async fn deliver(&self, batch: &[SecurityEvent]) -> Result<(), SinkError> {
        let mut encoded = Vec::new();
        for event in batch {
            serde_json::to_writer(&mut encoded, event)?;
            encoded.push(b'\n');
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&encoded).await?;
        file.flush().await?;

        log::debug!("Spooled {} events to {}", batch.len(), self.path.display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
