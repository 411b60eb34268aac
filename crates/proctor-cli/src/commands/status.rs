use anyhow::Result;
use proctor_core::{ProctorConfig, WARNING_THRESHOLD};
use proctor_storage::{Database, SessionStatus, StorageKey};

use super::helpers::{load_events, load_session_state};

/// Show the last persisted session state
///
/// # Errors
///
/// Returns an error if the database cannot be opened or a stored document
/// is corrupt
pub fn status_command(config: &ProctorConfig) -> Result<()> {
    let db = Database::new(&config.database_path()?)?;

    let Some(state) = load_session_state(&db)? else {
        println!("No session recorded yet.");
        return Ok(());
    };

    println!("Attempt: {}", config.attempt_id);
    println!("Status: {}", state.status.description());
    println!(
        "Violations: {}/{} ({} before lock)",
        state.violation_count,
        config.max_violations,
        state.violations_remaining(config.max_violations)
    );
    if state.status == SessionStatus::Active
        && state.violations_remaining(config.max_violations) <= WARNING_THRESHOLD
    {
        println!("Warning: the session is close to locking.");
    }
    println!("Time remaining: {}", state.remaining_hms());
    if let Some(started_at) = state.started_at {
        println!("Started: {}", started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(updated_at) = db.document_updated_at(StorageKey::SessionState.as_str())? {
        println!("Last update: {}", updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    let pending = load_events(&db, StorageKey::PendingQueue)?;
    let history = load_events(&db, StorageKey::SessionHistory)?;
    println!(
        "\nEvents: {} recorded, {} awaiting delivery",
        history.len(),
        pending.len()
    );
    Ok(())
}
