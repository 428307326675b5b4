//! Thread-safe SQLite handle shared by the three memory tiers.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::Result;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Execute a closure with access to the connection. Every tier's writes
    /// go through this one serialized path (spec §5 "one serialized writer").
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn)
    }
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS core_blocks (
            name TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS recall (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL DEFAULT (datetime('now')),
            role TEXT NOT NULL,
            text TEXT NOT NULL,
            tag TEXT
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS recall_fts USING fts5(
            text,
            content=recall,
            content_rowid=id,
            tokenize='porter unicode61'
        );

        CREATE TRIGGER IF NOT EXISTS recall_ai AFTER INSERT ON recall BEGIN
            INSERT INTO recall_fts(rowid, text) VALUES (new.id, new.text);
        END;
        CREATE TRIGGER IF NOT EXISTS recall_ad AFTER DELETE ON recall BEGIN
            INSERT INTO recall_fts(recall_fts, rowid, text) VALUES('delete', old.id, old.text);
        END;
        CREATE TRIGGER IF NOT EXISTS recall_au AFTER UPDATE ON recall BEGIN
            INSERT INTO recall_fts(recall_fts, rowid, text) VALUES('delete', old.id, old.text);
            INSERT INTO recall_fts(rowid, text) VALUES (new.id, new.text);
        END;

        CREATE TABLE IF NOT EXISTS archival (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL DEFAULT (datetime('now')),
            text TEXT NOT NULL
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS archival_fts USING fts5(
            text,
            content=archival,
            content_rowid=id,
            tokenize='porter unicode61'
        );

        CREATE TRIGGER IF NOT EXISTS archival_ai AFTER INSERT ON archival BEGIN
            INSERT INTO archival_fts(rowid, text) VALUES (new.id, new.text);
        END;
        CREATE TRIGGER IF NOT EXISTS archival_ad AFTER DELETE ON archival BEGIN
            INSERT INTO archival_fts(archival_fts, rowid, text) VALUES('delete', old.id, old.text);
        END;
        CREATE TRIGGER IF NOT EXISTS archival_au AFTER UPDATE ON archival BEGIN
            INSERT INTO archival_fts(archival_fts, rowid, text) VALUES('delete', old.id, old.text);
            INSERT INTO archival_fts(rowid, text) VALUES (new.id, new.text);
        END;
        ",
    )?;
    Ok(())
}
