//! Persistence for coverage snapshots.
//!
//! The store only stores: it upserts by `(repo_id, revision)` and never
//! merges. Merging is the provider's job, before `put` is called.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{CovhubError, Result};
use crate::model::{Coverage, CoverageEntry};
use crate::upload::{self, CoverageEntryUploadRequest};

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

/// Storage abstraction consumed by the provider. Absence is `Ok(None)` or
/// an empty list, never an error.
pub trait CoverageStore: Send + Sync {
    fn find(&self, id: i64) -> Result<Option<Coverage>>;
    fn find_revision(&self, repo_id: i64, revision: &str) -> Result<Option<Coverage>>;
    fn list(&self, repo_id: i64) -> Result<Vec<Coverage>>;
    fn list_all(&self) -> Result<Vec<Coverage>>;

    /// Upsert by `(repo_id, revision)`: insert assigns `cov.id`, update
    /// rewrites the contents in place and leaves `id` and `time` unchanged.
    fn put(&self, cov: &mut Coverage) -> Result<()>;
}

/// SQLite-backed store. The connection sits behind a mutex because rusqlite
/// connections are `Send` but not `Sync`.
pub struct SqliteCoverageStore {
    conn: Mutex<Connection>,
}

impl SqliteCoverageStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn)
    }

    /// In-memory store, for tests and single-shot runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CovhubError::Other("coverage store lock poisoned".to_string()))
    }
}

/// Ensure the schema is initialized. Safe to call on an already-initialized
/// database.
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: u32 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?;
    if count == 0 {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    let version: u32 = conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })?;
    if version != SCHEMA_VERSION {
        return Err(CovhubError::Other(format!(
            "Database schema version {} is not supported by this binary ({}).",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// Serialize entries into the persisted blob: a JSON array in the
/// upload-entry shape, profiles included.
fn encode_entries(entries: &[CoverageEntry]) -> Result<String> {
    let records: Vec<CoverageEntryUploadRequest> = entries
        .iter()
        .map(CoverageEntryUploadRequest::from_entry)
        .collect();
    Ok(serde_json::to_string(&records)?)
}

fn decode_entries(contents: &str) -> Result<Vec<CoverageEntry>> {
    let records: Vec<CoverageEntryUploadRequest> = serde_json::from_str(contents)?;
    upload::parse_entries(&records)
}

fn row_to_coverage(
    id: i64,
    repo_id: i64,
    revision: String,
    time: &str,
    contents: &str,
) -> Result<Coverage> {
    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(time)
        .map_err(|e| CovhubError::Other(format!("invalid timestamp in store: {}", e)))?
        .with_timezone(&Utc);

    let mut cov = Coverage::new(repo_id, revision, timestamp);
    cov.id = id;
    cov.entries = decode_entries(contents)?;
    Ok(cov)
}

fn scan(conn: &Connection, sql: &str, args: &[&dyn rusqlite::types::ToSql]) -> Result<Vec<Coverage>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut coverages = Vec::new();
    for row in rows {
        let (id, repo_id, revision, time, contents) = row?;
        coverages.push(row_to_coverage(id, repo_id, revision, &time, &contents)?);
    }
    Ok(coverages)
}

const SELECT: &str = "SELECT id, repo_id, revision, time, contents FROM coverage";

impl CoverageStore for SqliteCoverageStore {
    fn find(&self, id: i64) -> Result<Option<Coverage>> {
        let conn = self.lock()?;
        let sql = format!("{} WHERE id = ?1", SELECT);
        Ok(scan(&conn, &sql, params![id])?.into_iter().next())
    }

    fn find_revision(&self, repo_id: i64, revision: &str) -> Result<Option<Coverage>> {
        let conn = self.lock()?;
        let sql = format!("{} WHERE repo_id = ?1 AND revision = ?2", SELECT);
        Ok(scan(&conn, &sql, params![repo_id, revision])?
            .into_iter()
            .next())
    }

    fn list(&self, repo_id: i64) -> Result<Vec<Coverage>> {
        let conn = self.lock()?;
        let sql = format!("{} WHERE repo_id = ?1", SELECT);
        scan(&conn, &sql, params![repo_id])
    }

    fn list_all(&self) -> Result<Vec<Coverage>> {
        let conn = self.lock()?;
        scan(&conn, SELECT, params![])
    }

    fn put(&self, cov: &mut Coverage) -> Result<()> {
        let contents = encode_entries(&cov.entries)?;
        let conn = self.lock()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM coverage WHERE repo_id = ?1 AND revision = ?2",
                params![cov.repo_id, cov.revision],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            None => {
                debug!(
                    repo_id = cov.repo_id,
                    revision = %cov.revision,
                    "insert coverage"
                );
                conn.execute(
                    "INSERT INTO coverage (repo_id, revision, time, contents) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        cov.repo_id,
                        cov.revision,
                        cov.timestamp.to_rfc3339(),
                        contents
                    ],
                )?;
                cov.id = conn.last_insert_rowid();
            }
            Some(id) => {
                debug!(
                    repo_id = cov.repo_id,
                    revision = %cov.revision,
                    id,
                    "update coverage"
                );
                conn.execute(
                    "UPDATE coverage SET contents = ?1 WHERE id = ?2",
                    params![contents, id],
                )?;
                cov.id = id;
            }
        }

        Ok(())
    }
}
