use anyhow::Result;
use proctor_core::ProctorConfig;
use proctor_storage::{Database, SecurityEvent, StorageKey};
use tabled::{Table, Tabled};

use super::helpers::{load_events, truncate_str};

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Violations")]
    violations: u32,
    #[tabled(rename = "Details")]
    details: String,
}

impl From<&SecurityEvent> for EventRow {
    fn from(event: &SecurityEvent) -> Self {
        let context = &event.context;
        Self {
            time: event
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string(),
            event: event.kind.to_string(),
            violations: context.violation_count,
            details: format!(
                "{}, focus={}, {}, {} ({})",
                context.visibility.as_str(),
                context.has_focus,
                if context.online { "online" } else { "offline" },
                context.display,
                truncate_str(&context.user_agent, 24)
            ),
        }
    }
}

/// Print the session history (or the unsent queue), newest first
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the document is
/// corrupt
pub fn logs_command(config: &ProctorConfig, pending: bool, limit: Option<usize>) -> Result<()> {
    let db = Database::new(&config.database_path()?)?;
    let key = if pending {
        StorageKey::PendingQueue
    } else {
        StorageKey::SessionHistory
    };
    let events = load_events(&db, key)?;

    if events.is_empty() {
        println!("No events logged.");
        return Ok(());
    }

    let rows = newest_first(&events, limit);
    println!("{}", Table::new(rows));
    println!("\n{} of {} events ({key})", rows_shown(events.len(), limit), events.len());
    Ok(())
}

fn newest_first(events: &[SecurityEvent], limit: Option<usize>) -> Vec<EventRow> {
    events
        .iter()
        .rev()
        .take(limit.unwrap_or(usize::MAX))
        .map(EventRow::from)
        .collect()
}

fn rows_shown(total: usize, limit: Option<usize>) -> usize {
    limit.map_or(total, |limit| limit.min(total))
}
