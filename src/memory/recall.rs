//! Recall memory tier — append-only, text-indexed log of past turns and
//! compaction summaries (spec §4.5, §4.8).

use rusqlite::params;
use serde::Serialize;

use super::db::Database;
use crate::error::Result;

/// Total text bytes above which `gc` truncates the oldest entries.
pub const GC_CAP_BYTES: usize = 256 * 1024;

/// Marker inserted in place of entries `gc` truncates via [`append`]'s
/// automatic cap check.
const GC_MARKER: &str = "earlier recall entries were truncated by garbage collection";

#[derive(Debug, Clone, Serialize)]
pub struct RecallRecord {
    pub id: i64,
    pub ts: String,
    pub role: String,
    pub text: String,
    pub tag: Option<String>,
}

/// Append a turn or summary. Committed before returning (spec §4.5
/// "write-through: each append is committed before returning"), then runs
/// `gc` so the cap (spec §4.5 "oldest entries are truncated") is an
/// invariant of the tier rather than something callers must remember to run.
pub fn append(db: &Database, role: &str, text: &str, tag: Option<&str>) -> Result<i64> {
    let id = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO recall (role, text, tag) VALUES (?1, ?2, ?3)",
            params![role, text, tag],
        )?;
        Ok(conn.last_insert_rowid())
    })?;
    gc(db, GC_MARKER)?;
    Ok(id)
}

/// Top-`k` records matching `query` by FTS5 rank.
pub fn search(db: &Database, query: &str, k: usize) -> Result<Vec<RecallRecord>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT r.id, r.ts, r.role, r.text, r.tag
             FROM recall_fts fts
             JOIN recall r ON r.id = fts.rowid
             WHERE recall_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![query, k as i64], row_to_record)?;
        collect(rows)
    })
}

/// Most recent `limit` records, oldest first (used for GC and recent-context
/// assembly).
pub fn recent(db: &Database, limit: usize) -> Result<Vec<RecallRecord>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, ts, role, text, tag FROM recall ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_record)?;
        let mut out = collect(rows)?;
        out.reverse();
        Ok(out)
    })
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<RecallRecord> {
    Ok(RecallRecord {
        id: row.get(0)?,
        ts: row.get(1)?,
        role: row.get(2)?,
        text: row.get(3)?,
        tag: row.get(4)?,
    })
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<RecallRecord>>,
) -> Result<Vec<RecallRecord>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Truncate the oldest entries once total size exceeds `GC_CAP_BYTES`,
/// inserting `summary` in their place (spec §4.5 GC).
pub fn gc(db: &Database, summary: &str) -> Result<()> {
    let total: usize = db.with_conn(|conn| {
        conn.query_row("SELECT COALESCE(SUM(LENGTH(text)), 0) FROM recall", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .map_err(Into::into)
    })?;
    if total <= GC_CAP_BYTES {
        return Ok(());
    }

    db.with_conn(|conn| {
        let oldest_half: i64 =
            conn.query_row("SELECT COUNT(*) FROM recall", [], |row| row.get(0))? / 2;
        conn.execute(
            "DELETE FROM recall WHERE id IN (SELECT id FROM recall ORDER BY id ASC LIMIT ?1)",
            params![oldest_half],
        )?;
        conn.execute(
            "INSERT INTO recall (role, text, tag) VALUES ('system', ?1, 'gc_summary')",
            params![summary],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_is_immediately_searchable() {
        let db = Database::open_in_memory().unwrap();
        append(&db, "user", "where is the quantum physics paper?", None).unwrap();
        let hits = search(&db, "quantum", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("quantum"));
    }

    #[test]
    fn recent_preserves_chronological_order() {
        let db = Database::open_in_memory().unwrap();
        append(&db, "user", "first", None).unwrap();
        append(&db, "assistant", "second", None).unwrap();
        let recs = recent(&db, 10).unwrap();
        assert_eq!(recs[0].text, "first");
        assert_eq!(recs[1].text, "second");
    }

    #[test]
    fn gc_is_a_no_op_below_cap() {
        let db = Database::open_in_memory().unwrap();
        append(&db, "user", "small", None).unwrap();
        gc(&db, "summary").unwrap();
        assert_eq!(recent(&db, 10).unwrap().len(), 1);
    }

    #[test]
    fn append_triggers_gc_once_the_cap_is_exceeded() {
        let db = Database::open_in_memory().unwrap();
        let chunk = "x".repeat(4096);
        let entries_over_cap = GC_CAP_BYTES / chunk.len() + 2;
        for _ in 0..entries_over_cap {
            append(&db, "user", &chunk, None).unwrap();
        }

        let remaining = recent(&db, 10_000).unwrap();
        assert!(remaining.len() < entries_over_cap);
        assert!(remaining.iter().any(|r| r.tag.as_deref() == Some("gc_summary")));
    }
}
