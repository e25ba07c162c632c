use crate::classify::extract_delta;
use crate::error::{LocError, Result};
use crate::model::RawFileDiff;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Per-commit diff results, so a rescan never diffs the same commit pair
/// twice.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn new<CP: AsRef<Path>, RP: AsRef<Path>>(cache_path: Option<CP>, repo_path: RP) -> Result<Self> {
        let cache_dir = match cache_path {
            Some(path) => path.as_ref().to_path_buf(),
            None => repo_path.as_ref().join(".locflow"),
        };
        std::fs::create_dir_all(&cache_dir)?;
        let db_path = cache_dir.join("cache.db");
        let conn = Connection::open(&db_path)?;
        // Parallel scans may share one --cache directory.
        conn.busy_timeout(std::time::Duration::from_secs(10))?;
        let mut cache = Self { conn };
        cache.initialize()?;
        Ok(cache)
    }

    pub fn in_memory() -> Result<Self> {
        let mut cache = Self {
            conn: Connection::open_in_memory()?,
        };
        cache.initialize()?;
        Ok(cache)
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS diffs (
                commit_id TEXT NOT NULL,
                parent_id TEXT NOT NULL,
                computed_at INTEGER NOT NULL,
                PRIMARY KEY (commit_id, parent_id)
            );
            CREATE TABLE IF NOT EXISTS files (
                commit_id TEXT NOT NULL,
                parent_id TEXT NOT NULL,
                path TEXT NOT NULL,
                added_lines INTEGER NOT NULL,
                removed_lines INTEGER NOT NULL,
                is_binary INTEGER NOT NULL,
                PRIMARY KEY (commit_id, parent_id, path),
                FOREIGN KEY (commit_id, parent_id) REFERENCES diffs(commit_id, parent_id)
            );
            ",
        )?;
        self.check_schema_version()?;
        Ok(())
    }

    fn check_schema_version(&mut self) -> Result<()> {
        let user_version: i64 = self
            .conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))?;

        if user_version == 0 {
            let set_stmt = format!("PRAGMA user_version = {CACHE_SCHEMA_VERSION};");
            self.conn.execute_batch(&set_stmt)?;
        } else if user_version != i64::from(CACHE_SCHEMA_VERSION) {
            return Err(LocError::Cache(format!(
                "Schema version mismatch: expected {}, found {}",
                CACHE_SCHEMA_VERSION, user_version
            )));
        }

        Ok(())
    }

    /// `None` when this commit pair was never stored; an empty list when it
    /// was stored with no file changes.
    pub fn get_diffs(&self, commit_id: &str, parent_id: Option<&str>) -> Result<Option<Vec<RawFileDiff>>> {
        let parent_id = parent_id.unwrap_or("");
        let known: Option<i64> = self
            .conn
            .query_row(
                "SELECT computed_at FROM diffs WHERE commit_id = ? AND parent_id = ?",
                params![commit_id, parent_id],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            "SELECT path, added_lines, removed_lines, is_binary
             FROM files WHERE commit_id = ? AND parent_id = ?
             ORDER BY path",
        )?;
        let rows = stmt.query_map(params![commit_id, parent_id], |row| {
            let path: String = row.get(0)?;
            let added: i64 = row.get(1)?;
            let removed: i64 = row.get(2)?;
            let is_binary: i64 = row.get(3)?;
            Ok(if is_binary != 0 {
                RawFileDiff::binary(path)
            } else {
                RawFileDiff::counted(path, added.max(0) as u64, removed.max(0) as u64)
            })
        })?;

        Ok(Some(rows.collect::<rusqlite::Result<Vec<_>>>()?))
    }

    pub fn store_diffs(&mut self, commit_id: &str, parent_id: Option<&str>, files: &[RawFileDiff]) -> Result<()> {
        let parent_id = parent_id.unwrap_or("");
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM files WHERE commit_id = ? AND parent_id = ?",
            params![commit_id, parent_id],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO diffs (commit_id, parent_id, computed_at) VALUES (?, ?, ?)",
            params![commit_id, parent_id, Utc::now().timestamp()],
        )?;

        {
            let mut insert_file_stmt = tx.prepare(
                "INSERT INTO files (commit_id, parent_id, path, added_lines, removed_lines, is_binary)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (commit_id, parent_id, path) DO UPDATE SET
                    added_lines = added_lines + excluded.added_lines,
                    removed_lines = removed_lines + excluded.removed_lines,
                    is_binary = MAX(is_binary, excluded.is_binary)",
            )?;
            for f in files {
                let (added, removed) = extract_delta(f);
                insert_file_stmt.execute(params![
                    commit_id,
                    parent_id,
                    f.path,
                    added as i64,
                    removed as i64,
                    if f.is_binary() { 1 } else { 0 }
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn diff_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM diffs", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_diffs_come_back_counted() {
        let mut cache = Cache::in_memory().unwrap();
        assert!(cache.get_diffs("c1", None).unwrap().is_none());

        let patch = "@@ -1 +1,2 @@\n-a\n+b\n+c\n";
        cache
            .store_diffs(
                "c1",
                Some("p1"),
                &[RawFileDiff::unified("src/a.rs", patch), RawFileDiff::binary("logo.png")],
            )
            .unwrap();

        let diffs = cache.get_diffs("c1", Some("p1")).unwrap().unwrap();
        assert_eq!(
            diffs,
            vec![RawFileDiff::binary("logo.png"), RawFileDiff::counted("src/a.rs", 2, 1)]
        );
        assert!(cache.get_diffs("c1", None).unwrap().is_none());
        assert_eq!(cache.diff_count().unwrap(), 1);
    }

    #[test]
    fn empty_diff_is_remembered() {
        let mut cache = Cache::in_memory().unwrap();
        cache.store_diffs("merge", Some("p"), &[]).unwrap();
        assert_eq!(cache.get_diffs("merge", Some("p")).unwrap(), Some(vec![]));
    }
}
