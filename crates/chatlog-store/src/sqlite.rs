//! SQLite-backed `StreamStore`.
//!
//! Grounded on `SqliteStorage` / `EventJournal::append_durable`
//! (`crates/agent/src/session/sqlite_storage.rs`): a single `Connection`
//! guarded by a blocking-friendly mutex, all queries dispatched through
//! `spawn_blocking`, offsets allocated with an atomic
//! `UPDATE ... RETURNING` against a per-session counter row.

use crate::error::{StoreError, StoreResult};
use crate::offset::Offset;
use crate::schema::apply_migrations;
use crate::store::{ReadBatch, ReadMode, StoredRow, StreamStore};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const LIVE_BUFFER: usize = 1024;

/// SQLite-backed stream store for durable, crash-surviving persistence.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    live: Arc<std::sync::Mutex<HashMap<String, broadcast::Sender<StoredRow>>>>,
}

impl SqliteStore {
    pub async fn connect(path: PathBuf) -> StoreResult<Self> {
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, rusqlite::Error> {
            let mut conn = Connection::open(&path)?;
            conn.execute("PRAGMA foreign_keys = ON;", [])?;
            apply_migrations(&mut conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Fatal(format!("spawn_blocking join failed: {e}")))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            live: Arc::new(std::sync::Mutex::new(HashMap::new())),
        })
    }

    async fn run_blocking<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn_arc = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn_arc.lock().unwrap();
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Fatal(format!("spawn_blocking join failed: {e}")))?
        .map_err(StoreError::from)
    }

    fn sender_for(&self, session_key: &str) -> broadcast::Sender<StoredRow> {
        let mut live = self.live.lock().unwrap();
        live.entry(session_key.to_string())
            .or_insert_with(|| broadcast::channel(LIVE_BUFFER).0)
            .clone()
    }
}

#[async_trait]
impl StreamStore for SqliteStore {
    async fn create(&self, session_key: &str) -> StoreResult<()> {
        let key = session_key.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO session_logs (session_key, next_offset) VALUES (?1, 0)",
                params![key],
            )?;
            Ok(())
        })
        .await
    }

    async fn append(&self, session_key: &str, bytes: Vec<u8>) -> StoreResult<Offset> {
        let key = session_key.to_string();
        let bytes_clone = bytes.clone();

        let raw_offset: u64 = self
            .run_blocking(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO session_logs (session_key, next_offset) VALUES (?1, 0)",
                    params![key],
                )?;

                let offset: u64 = conn.query_row(
                    "UPDATE session_logs SET next_offset = next_offset + 1 \
                     WHERE session_key = ?1 RETURNING next_offset - 1",
                    params![key],
                    |row| row.get(0),
                )?;

                conn.execute(
                    "INSERT INTO chunks (session_key, offset, bytes) VALUES (?1, ?2, ?3)",
                    params![key, offset, bytes_clone],
                )?;

                Ok(offset)
            })
            .await?;

        let offset = Offset::new(raw_offset);
        let sender = self.sender_for(session_key);
        let _ = sender.send(StoredRow { offset, bytes });
        Ok(offset)
    }

    async fn read(
        &self,
        session_key: &str,
        from_offset: Option<Offset>,
        _mode: ReadMode,
    ) -> StoreResult<ReadBatch> {
        let key = session_key.to_string();
        let floor = from_offset.map(|o| o.as_u64() as i64).unwrap_or(0);

        let (rows, next_offset, exists): (Vec<StoredRow>, u64, bool) = self
            .run_blocking(move |conn| {
                let exists: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM session_logs WHERE session_key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;

                if exists.is_none() {
                    return Ok((Vec::new(), 0, false));
                }

                let next_offset: u64 = conn.query_row(
                    "SELECT next_offset FROM session_logs WHERE session_key = ?1",
                    params![key],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(
                    "SELECT offset, bytes FROM chunks WHERE session_key = ?1 AND offset >= ?2 \
                     ORDER BY offset ASC",
                )?;
                let rows = stmt
                    .query_map(params![key, floor], |row| {
                        Ok(StoredRow {
                            offset: Offset::new(row.get(0)?),
                            bytes: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok((rows, next_offset, true))
            })
            .await?;

        if !exists {
            return Err(StoreError::NotFound(session_key.to_string()));
        }

        Ok(ReadBatch {
            rows,
            next_offset: Offset::new(next_offset),
            up_to_date: true,
        })
    }

    fn subscribe(&self, session_key: &str) -> broadcast::Receiver<StoredRow> {
        self.sender_for(session_key).subscribe()
    }

    async fn delete(&self, session_key: &str) -> StoreResult<()> {
        let key = session_key.to_string();
        self.run_blocking(move |conn| {
            conn.execute("DELETE FROM session_logs WHERE session_key = ?1", params![key])?;
            Ok(())
        })
        .await?;
        self.live.lock().unwrap().remove(session_key);
        Ok(())
    }
}
