//! Archival memory tier — long-term fact store written only through the
//! `memory_store` tool (spec §4.5).

use rusqlite::params;
use serde::Serialize;

use super::db::Database;
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct ArchivalRecord {
    pub id: i64,
    pub ts: String,
    pub text: String,
}

pub fn store(db: &Database, text: &str) -> Result<i64> {
    db.with_conn(|conn| {
        conn.execute("INSERT INTO archival (text) VALUES (?1)", params![text])?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn search(db: &Database, query: &str, k: usize) -> Result<Vec<ArchivalRecord>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT a.id, a.ts, a.text
             FROM archival_fts fts
             JOIN archival a ON a.id = fts.rowid
             WHERE archival_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![query, k as i64], |row| {
            Ok(ArchivalRecord {
                id: row.get(0)?,
                ts: row.get(1)?,
                text: row.get(2)?,
            })
        })?;
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
    fn store_and_search_round_trips() {
        let db = Database::open_in_memory().unwrap();
        store(&db, "the user's favorite language is Rust").unwrap();
        let hits = search(&db, "Rust", 5).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
