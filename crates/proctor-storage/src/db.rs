//! SQLite-backed durable store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::migrations;
use crate::store::{DurableStore, StorageKey};

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `db_path`
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation, connection opening, or schema initialization fails
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(db_path).context("Failed to open database connection")?;
        migrations::init_schema(&conn)?;

        log::info!("Database initialized at: {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a database that lives only as long as this value
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema initialization fails
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        migrations::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get a stored document
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_document(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM documents WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a document
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn put_document(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO documents (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// When a document was last written
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the stored timestamp is malformed
    pub fn document_updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT updated_at FROM documents WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("Malformed updated_at for {key}: {s}"))
        })
        .transpose()
    }
}

impl DurableStore for Database {
    fn load(&self, key: StorageKey) -> Result<Option<String>> {
        self.get_document(key.as_str())
    }

    fn save(&self, key: StorageKey, value: &str) -> Result<()> {
        self.put_document(key.as_str(), value)
            .with_context(|| format!("Failed to persist {key}"))
    }
}
