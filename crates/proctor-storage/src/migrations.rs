use anyhow::Result;
use rusqlite::Connection;

/// Initialize database schema
///
/// # Errors
///
/// Returns an error if table creation fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Key/value documents: pending queue, history, session state
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}
