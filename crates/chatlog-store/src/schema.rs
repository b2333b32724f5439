//! Forward-only SQLite migrations for the stream store.

use rusqlite::Connection;
use std::collections::HashSet;
use time::OffsetDateTime;

struct Migration {
    version: &'static str,
    apply: fn(&mut Connection) -> Result<(), rusqlite::Error>,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: "0001_initial",
    apply: migration_0001_initial,
}];

pub fn apply_migrations(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );
        "#,
    )?;

    let applied = load_applied_migrations(conn)?;

    for migration in MIGRATIONS {
        if applied.contains(migration.version) {
            continue;
        }

        (migration.apply)(conn)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, OffsetDateTime::now_utc().unix_timestamp()],
        )?;
    }

    Ok(())
}

fn load_applied_migrations(conn: &Connection) -> Result<HashSet<String>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

fn migration_0001_initial(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS session_logs (
            session_key TEXT PRIMARY KEY,
            next_offset INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY,
            session_key TEXT NOT NULL,
            offset INTEGER NOT NULL,
            bytes BLOB NOT NULL,
            FOREIGN KEY(session_key) REFERENCES session_logs(session_key) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_session_offset
            ON chunks(session_key, offset);
        "#,
    )
}
