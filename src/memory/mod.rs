//! Three-tier memory store — Core / Recall / Archival (spec §4.5,
//! component C6), backed by one embedded SQLite file shared across tiers.

pub mod archival;
pub mod core;
pub mod db;
pub mod recall;

use std::path::Path;

pub use archival::ArchivalRecord;
pub use recall::RecallRecord;

use db::Database;

use crate::error::Result;

pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self { db: Database::open(path)? })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { db: Database::open_in_memory()? })
    }

    // ---- Core ----

    pub fn core_get(&self, name: &str) -> Result<Option<String>> {
        core::get(&self.db, name)
    }

    pub fn core_set(&self, name: &str, text: &str) -> Result<()> {
        core::set(&self.db, name, text)
    }

    pub fn core_all(&self) -> Result<Vec<(String, String)>> {
        core::all(&self.db)
    }

    // ---- Recall ----

    pub fn recall_append(&self, role: &str, text: &str, tag: Option<&str>) -> Result<i64> {
        recall::append(&self.db, role, text, tag)
    }

    pub fn recall_search(&self, query: &str, k: usize) -> Result<Vec<RecallRecord>> {
        recall::search(&self.db, query, k)
    }

    pub fn recall_recent(&self, limit: usize) -> Result<Vec<RecallRecord>> {
        recall::recent(&self.db, limit)
    }

    pub fn recall_gc(&self, summary: &str) -> Result<()> {
        recall::gc(&self.db, summary)
    }

    // ---- Archival / tool-facing ops ----

    /// Backs the `memory_store` tool.
    pub fn memory_store(&self, text: &str) -> Result<i64> {
        archival::store(&self.db, text)
    }

    /// Backs the `memory_search` tool.
    pub fn memory_search(&self, query: &str, k: usize) -> Result<Vec<ArchivalRecord>> {
        archival::search(&self.db, query, k)
    }

    /// Backs the `memory_core_update` tool.
    pub fn memory_core_update(&self, name: &str, text: &str) -> Result<()> {
        core::set(&self.db, name, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archival_tool_facing_ops_round_trip() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.memory_core_update("persona", "terse").unwrap();
        assert_eq!(store.core_get("persona").unwrap().as_deref(), Some("terse"));

        store.memory_store("project deadline is next Friday").unwrap();
        let hits = store.memory_search("deadline", 5).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
