//! Read-only projections over the store
//!
//! Nothing here writes; every query reflects the state left by the last
//! completed reconciliation pass.

use std::path::Path;

use rusqlite::OptionalExtension;

use crate::error::CacheResult;
use crate::models::{CacheStats, FileRecord, IndexRecord, Value};
use crate::reconcile::normalize_path;
use crate::store::{file_record_from_row, Store, FILES_TABLE, INDICES_TABLE};

impl Store {
    /// Every stored index record with its owning path, in insertion order
    pub fn list_all(&self) -> CacheResult<Vec<IndexRecord>> {
        let sql = format!("{} ORDER BY i.id", self.sql.select_records);
        self.select_records(&sql, rusqlite::params![])
    }

    /// Records owned by the file at `path`; empty when the path is untracked
    pub fn lookup(&self, path: &Path) -> CacheResult<Vec<IndexRecord>> {
        // A path that cannot be made absolute was never stored
        let Ok(key) = normalize_path(path) else {
            return Ok(Vec::new());
        };
        let sql = format!("{} WHERE f.path = ?1 ORDER BY i.id", self.sql.select_records);
        self.select_records(&sql, [key])
    }

    /// All tracked files, ordered by path
    pub fn tracked_files(&self) -> CacheResult<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, path, last_modified, content_hash FROM {FILES_TABLE} ORDER BY path"
        ))?;
        let files = stmt
            .query_map([], file_record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// The stored fingerprint of one file, if tracked
    pub fn file_record(&self, path: &Path) -> CacheResult<Option<FileRecord>> {
        let Ok(key) = normalize_path(path) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT id, path, last_modified, content_hash FROM {FILES_TABLE} WHERE path = ?1"
        );
        let record = self
            .conn
            .query_row(&sql, [key], file_record_from_row)
            .optional()?;
        Ok(record)
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        let total_files: usize = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {FILES_TABLE}"),
            [],
            |row| row.get(0),
        )?;
        let total_records: usize = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {INDICES_TABLE}"),
            [],
            |row| row.get(0),
        )?;

        Ok(CacheStats {
            total_files,
            total_records,
            last_synced: self.get_meta("last_synced")?,
        })
    }

    fn select_records<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> CacheResult<Vec<IndexRecord>> {
        let names: Vec<String> = self
            .schema()
            .fields()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        let path_column = names.len();

        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, |row| {
                let mut fields = Vec::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    fields.push((name.clone(), Value::from(row.get_ref(i)?)));
                }
                Ok(IndexRecord {
                    path: row.get(path_column)?,
                    fields,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
