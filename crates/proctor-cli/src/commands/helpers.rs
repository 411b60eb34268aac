//! Helper utility functions for CLI commands

use anyhow::{Context, Result};
use proctor_storage::{Database, DurableStore, SecurityEvent, SessionState, StorageKey};

/// Safely truncate a string to a maximum number of characters (not bytes).
/// This avoids panics when slicing multi-byte UTF-8 characters.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// Read an event list document, treating a missing key as empty
pub fn load_events(db: &Database, key: StorageKey) -> Result<Vec<SecurityEvent>> {
    match db.load(key)? {
        Some(raw) => serde_json::from_str(&raw).with_context(|| format!("Corrupt {key} document")),
        None => Ok(Vec::new()),
    }
}

/// Read the last persisted session state, if any
pub fn load_session_state(db: &Database) -> Result<Option<SessionState>> {
    db.load(StorageKey::SessionState)?
        .map(|raw| serde_json::from_str(&raw).context("Corrupt session_state document"))
        .transpose()
}
