//! Core memory tier — bounded named blocks reflected verbatim at the head
//! of every prompt (spec §4.5).

use rusqlite::{params, OptionalExtension};

use super::db::Database;
use crate::error::{NeuronError, Result};

pub const MAX_BLOCKS: usize = 8;
pub const MAX_BLOCK_BYTES: usize = 2 * 1024;

pub fn get(db: &Database, name: &str) -> Result<Option<String>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT text FROM core_blocks WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    })
}

/// Set a Core block's content, failing if it would exceed `MAX_BLOCK_BYTES`
/// or create a block beyond `MAX_BLOCKS`.
pub fn set(db: &Database, name: &str, text: &str) -> Result<()> {
    if text.len() > MAX_BLOCK_BYTES {
        return Err(NeuronError::InvalidArgument(format!(
            "core block '{name}' exceeds {MAX_BLOCK_BYTES} bytes"
        )));
    }
    db.with_conn(|conn| {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM core_blocks WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM core_blocks", [], |row| row.get(0))?;
            if count as usize >= MAX_BLOCKS {
                return Err(NeuronError::ResourceExhausted(format!(
                    "core memory already holds {MAX_BLOCKS} blocks"
                )));
            }
        }
        conn.execute(
            "INSERT INTO core_blocks (name, text, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(name) DO UPDATE SET text = excluded.text, updated_at = excluded.updated_at",
            params![name, text],
        )?;
        Ok(())
    })
}

/// All blocks, ordered by name, for prompt composition (spec §4.7 step 1).
pub fn all(db: &Database) -> Result<Vec<(String, String)>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT name, text FROM core_blocks ORDER BY name ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trips() {
        let db = Database::open_in_memory().unwrap();
        set(&db, "persona", "helpful assistant").unwrap();
        assert_eq!(get(&db, "persona").unwrap().as_deref(), Some("helpful assistant"));
    }

    #[test]
    fn rejects_oversized_block() {
        let db = Database::open_in_memory().unwrap();
        let huge = "x".repeat(MAX_BLOCK_BYTES + 1);
        assert!(set(&db, "too_big", &huge).is_err());
    }

    #[test]
    fn rejects_beyond_max_blocks() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..MAX_BLOCKS {
            set(&db, &format!("block{i}"), "x").unwrap();
        }
        assert!(set(&db, "one_too_many", "x").is_err());
        // Updating an existing block never counts against the cap.
        set(&db, "block0", "updated").unwrap();
        assert_eq!(get(&db, "block0").unwrap().as_deref(), Some("updated"));
    }
}
