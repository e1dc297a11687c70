//! SQLite store: schema management and row-level writes
//!
//! The store holds two tables: `files` (one row per tracked path) and
//! `indices` (the extracted records, each referencing its file with
//! `ON DELETE CASCADE`). A third table, `cache_meta`, keeps bookkeeping such
//! as the format version and the time of the last completed pass.
//!
//! Column names for `indices` come from a validated [`FieldSchema`] and are
//! quoted when the SQL text is generated at open time; values are always bound
//! as parameters.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::models::{FieldSchema, FileRecord, Value};

/// Table holding one row per tracked file
pub const FILES_TABLE: &str = "files";
/// Table holding the extracted index records
pub const INDICES_TABLE: &str = "indices";
/// Bookkeeping table
pub const META_TABLE: &str = "cache_meta";

/// Version of the table layout written by this crate
pub const FORMAT_VERSION: &str = "1";

/// Store files SQLite may leave next to the main database
const SIDECAR_SUFFIXES: &[&str] = &["-journal", "-wal", "-shm"];

/// SQL generated from the field schema
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    pub(crate) create_indices: String,
    pub(crate) insert_record: String,
    pub(crate) select_records: String,
}

impl Statements {
    fn new(schema: &FieldSchema) -> Self {
        let columns: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect();

        let column_defs: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| format!("{} {}", quote_ident(&f.name), f.field_type))
            .collect();

        let create_indices = format!(
            "CREATE TABLE IF NOT EXISTS {INDICES_TABLE} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                {},
                file_id INTEGER NOT NULL REFERENCES {FILES_TABLE}(id) ON DELETE CASCADE
            )",
            column_defs.join(",\n                ")
        );

        let placeholders: Vec<String> = (1..=columns.len() + 1)
            .map(|i| format!("?{}", i))
            .collect();
        let insert_record = format!(
            "INSERT INTO {INDICES_TABLE} ({}, file_id) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let select_records = format!(
            "SELECT {}, f.path
             FROM {INDICES_TABLE} i
             JOIN {FILES_TABLE} f ON i.file_id = f.id",
            columns
                .iter()
                .map(|c| format!("i.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Self {
            create_indices,
            insert_record,
            select_records,
        }
    }
}

/// Quote an identifier for inclusion in SQL text
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Exclusive handle on one cache store
#[derive(Debug)]
pub struct Store {
    pub(crate) conn: Connection,
    path: PathBuf,
    schema: FieldSchema,
    pub(crate) sql: Statements,
}

impl Store {
    /// Open or create the store at `path` and make sure its tables match `schema`
    ///
    /// A file that SQLite reports as corrupt or not a database is deleted and
    /// recreated once. Any other failure, or a failure on the second attempt,
    /// is [`CacheError::StoreUnavailable`].
    pub fn open(path: &Path, schema: FieldSchema, config: &CacheConfig) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
            }
        }

        let existed = path.exists();
        match Self::open_once(path, &schema, config) {
            Ok(store) => {
                if existed {
                    log::debug!("Opened existing cache store at {:?}", path);
                } else {
                    log::info!("Created cache store at {:?}", path);
                }
                Ok(store)
            }
            Err(err) if is_corrupt_store(&err) => {
                log::warn!("Cache store at {:?} is unreadable ({}), recreating it", path, err);
                discard(path)?;
                Self::open_once(path, &schema, config).map_err(|err| match err {
                    CacheError::Store(source) => CacheError::StoreUnavailable {
                        path: path.to_path_buf(),
                        source,
                    },
                    other => other,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn open_once(path: &Path, schema: &FieldSchema, config: &CacheConfig) -> CacheResult<Self> {
        let unavailable = |source| CacheError::StoreUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(unavailable)?;

        // Opening is lazy; the first read is what detects a non-database file
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(unavailable)?;

        configure(&conn, config)?;

        let store = Self {
            conn,
            path: path.to_path_buf(),
            schema: schema.clone(),
            sql: Statements::new(schema),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create missing tables and verify existing ones
    fn ensure_schema(&self) -> CacheResult<()> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {FILES_TABLE} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    path TEXT NOT NULL UNIQUE,
                    last_modified INTEGER NOT NULL,
                    content_hash TEXT NOT NULL
                )"
            ),
            [],
        )?;

        self.conn.execute(&self.sql.create_indices, [])?;

        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {META_TABLE} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )"
            ),
            [],
        )?;

        self.validate_schema()?;

        self.conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_indices_file ON {INDICES_TABLE}(file_id)"),
            [],
        )?;

        match self.get_meta("format_version")? {
            Some(version) if version != FORMAT_VERSION => {
                return Err(CacheError::SchemaMismatch {
                    table: META_TABLE.to_string(),
                    expected: format!("format_version {}", FORMAT_VERSION),
                    found: format!("format_version {}", version),
                });
            }
            Some(_) => {}
            None => self.set_meta("format_version", FORMAT_VERSION)?,
        }

        log::debug!("Cache schema ready ({} index fields)", self.schema.len());
        Ok(())
    }

    /// Compare the on-disk layout with the declared one
    fn validate_schema(&self) -> CacheResult<()> {
        let expected_files = vec![
            ("id".to_string(), "INTEGER".to_string()),
            ("path".to_string(), "TEXT".to_string()),
            ("last_modified".to_string(), "INTEGER".to_string()),
            ("content_hash".to_string(), "TEXT".to_string()),
        ];
        check_columns(FILES_TABLE, &expected_files, &self.table_columns(FILES_TABLE)?)?;

        let mut expected_indices = vec![("id".to_string(), "INTEGER".to_string())];
        expected_indices.extend(
            self.schema
                .fields()
                .iter()
                .map(|f| (f.name.clone(), f.field_type.to_string())),
        );
        expected_indices.push(("file_id".to_string(), "INTEGER".to_string()));
        check_columns(INDICES_TABLE, &expected_indices, &self.table_columns(INDICES_TABLE)?)?;

        // The cascade is what keeps index records from outliving their file
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA foreign_key_list({INDICES_TABLE})"))?;
        let cascades = stmt
            .query_map([], |row| {
                let table: String = row.get(2)?;
                let from: String = row.get(3)?;
                let on_delete: String = row.get(6)?;
                Ok(table.eq_ignore_ascii_case(FILES_TABLE)
                    && from == "file_id"
                    && on_delete.eq_ignore_ascii_case("CASCADE"))
            })?
            .collect::<Result<Vec<bool>, _>>()?;

        if !cascades.into_iter().any(|c| c) {
            return Err(CacheError::SchemaMismatch {
                table: INDICES_TABLE.to_string(),
                expected: "file_id REFERENCES files(id) ON DELETE CASCADE".to_string(),
                found: "no cascading file reference".to_string(),
            });
        }

        Ok(())
    }

    fn table_columns(&self, table: &str) -> CacheResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared: String = row.get(2)?;
                Ok((name, declared.to_ascii_uppercase()))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Path of the backing SQLite file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Load every file record, keyed by path
    pub fn load_files(&self) -> CacheResult<HashMap<String, FileRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, path, last_modified, content_hash FROM {FILES_TABLE}"
        ))?;
        let files = stmt
            .query_map([], file_record_from_row)?
            .map(|r| r.map(|rec| (rec.path.clone(), rec)))
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(files)
    }

    /// Insert a new file and its records in one transaction
    pub fn insert_file(
        &mut self,
        path: &str,
        last_modified: i64,
        content_hash: &str,
        rows: &[Vec<Value>],
    ) -> CacheResult<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {FILES_TABLE} (path, last_modified, content_hash) VALUES (?1, ?2, ?3)"
            ),
            params![path, last_modified, content_hash],
        )?;
        let file_id = tx.last_insert_rowid();
        insert_rows(&tx, &self.sql.insert_record, file_id, rows)?;
        tx.commit()?;
        Ok(file_id)
    }

    /// Replace a file's records and fingerprint in one transaction
    pub fn replace_file(
        &mut self,
        file_id: i64,
        last_modified: i64,
        content_hash: &str,
        rows: &[Vec<Value>],
    ) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM {INDICES_TABLE} WHERE file_id = ?1"),
            [file_id],
        )?;
        insert_rows(&tx, &self.sql.insert_record, file_id, rows)?;
        tx.execute(
            &format!(
                "UPDATE {FILES_TABLE} SET last_modified = ?1, content_hash = ?2 WHERE id = ?3"
            ),
            params![last_modified, content_hash, file_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Update only the stored timestamp of a file
    pub fn touch_file(&self, file_id: i64, last_modified: i64) -> CacheResult<()> {
        self.conn.execute(
            &format!("UPDATE {FILES_TABLE} SET last_modified = ?1 WHERE id = ?2"),
            params![last_modified, file_id],
        )?;
        Ok(())
    }

    /// Delete a file record; its index records go with it
    pub fn delete_file(&self, file_id: i64) -> CacheResult<()> {
        self.conn.execute(
            &format!("DELETE FROM {FILES_TABLE} WHERE id = ?1"),
            [file_id],
        )?;
        Ok(())
    }

    /// Delete every file record (and therefore every index record)
    pub fn delete_all_files(&self) -> CacheResult<usize> {
        let removed = self.conn.execute(&format!("DELETE FROM {FILES_TABLE}"), [])?;
        Ok(removed)
    }

    pub fn get_meta(&self, key: &str) -> CacheResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                &format!("SELECT value FROM {META_TABLE} WHERE key = ?1"),
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> CacheResult<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {META_TABLE} (key, value, updated_at) VALUES (?1, ?2, ?3)"
            ),
            params![key, value, now],
        )?;
        Ok(())
    }
}

/// Apply connection-level settings
fn configure(conn: &Connection, config: &CacheConfig) -> CacheResult<()> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

    conn.pragma_update(None, "foreign_keys", true)?;
    let enabled: i64 = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
    if enabled != 1 {
        return Err(CacheError::IntegrityUnsupported);
    }

    conn.pragma_update(None, "synchronous", config.synchronous.level())?;
    log::debug!(
        "Store configured: foreign_keys=ON, synchronous={}",
        config.synchronous
    );
    Ok(())
}

fn check_columns(
    table: &str,
    expected: &[(String, String)],
    found: &[(String, String)],
) -> CacheResult<()> {
    let matches = expected.len() == found.len()
        && expected
            .iter()
            .zip(found)
            .all(|((en, et), (fname, ft))| en.eq_ignore_ascii_case(fname) && et == ft);

    if matches {
        return Ok(());
    }

    let render = |cols: &[(String, String)]| {
        cols.iter()
            .map(|(n, t)| format!("{} {}", n, t))
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(CacheError::SchemaMismatch {
        table: table.to_string(),
        expected: render(expected),
        found: render(found),
    })
}

fn insert_rows(
    conn: &Connection,
    sql: &str,
    file_id: i64,
    rows: &[Vec<Value>],
) -> rusqlite::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let owner = Value::Integer(file_id);
    let mut stmt = conn.prepare_cached(sql)?;
    for row in rows {
        stmt.execute(params_from_iter(row.iter().chain(std::iter::once(&owner))))?;
    }
    Ok(())
}

pub(crate) fn file_record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        last_modified: row.get(2)?,
        content_hash: row.get(3)?,
    })
}

fn is_corrupt_store(err: &CacheError) -> bool {
    match err {
        CacheError::StoreUnavailable { source, .. } | CacheError::Store(source) => {
            CacheError::is_corruption(source)
        }
        _ => false,
    }
}

/// Remove a store file and any sidecar files SQLite left next to it
fn discard(path: &Path) -> CacheResult<()> {
    let mut targets = vec![path.to_path_buf()];
    for suffix in SIDECAR_SUFFIXES {
        let mut name = OsString::from(path.as_os_str());
        name.push(suffix);
        targets.push(PathBuf::from(name));
    }

    for target in targets {
        if target.exists() {
            std::fs::remove_file(&target).map_err(|e| CacheError::io(&target, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn schema() -> FieldSchema {
        FieldSchema::parse(&[("size", "integer"), ("kind", "text")]).unwrap()
    }

    fn open(path: &Path) -> Store {
        Store::open(path, schema(), &CacheConfig::default()).unwrap()
    }

    fn count(store: &Store, table: &str) -> i64 {
        store
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_open_creates_tables() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.sqlite");
        let store = open(&path);

        assert!(path.exists());
        let tables: Vec<String> = store
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&FILES_TABLE.to_string()));
        assert!(tables.contains(&INDICES_TABLE.to_string()));
        assert!(tables.contains(&META_TABLE.to_string()));
        assert_eq!(store.get_meta("format_version").unwrap().as_deref(), Some(FORMAT_VERSION));
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/cache.sqlite");
        open(&path);
        assert!(path.exists());
    }

    #[test]
    fn test_open_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.sqlite");

        {
            let mut store = open(&path);
            store
                .insert_file("/a.txt", 10, "hash", &[vec![Value::Integer(1), "x".into()]])
                .unwrap();
        }

        let store = open(&path);
        assert_eq!(store.load_files().unwrap().len(), 1);
        assert_eq!(count(&store, INDICES_TABLE), 1);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp.path().join("cache.sqlite"));
        let enabled: i64 = store
            .conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_synchronous_follows_config() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            synchronous: crate::config::SyncMode::Full,
            ..CacheConfig::default()
        };
        let store = Store::open(&temp.path().join("cache.sqlite"), schema(), &config).unwrap();
        let level: i64 = store
            .conn
            .pragma_query_value(None, "synchronous", |row| row.get(0))
            .unwrap();
        assert_eq!(level, 2);
    }

    #[test]
    fn test_corrupted_store_is_recreated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.sqlite");
        let garbage = b"this is definitely not a sqlite database, just garbage bytes";
        std::fs::write(&path, garbage).unwrap();

        let store = open(&path);
        assert!(store.load_files().unwrap().is_empty());
    }

    #[test]
    fn test_schema_mismatch_detected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.sqlite");
        drop(open(&path));

        let other = FieldSchema::parse(&[("width", "integer"), ("height", "integer")]).unwrap();
        let err = Store::open(&path, other, &CacheConfig::default()).unwrap_err();
        match err {
            CacheError::SchemaMismatch { table, expected, found } => {
                assert_eq!(table, INDICES_TABLE);
                assert!(expected.contains("width INTEGER"));
                assert!(found.contains("size INTEGER"));
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_schema_type_mismatch_detected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.sqlite");
        drop(open(&path));

        let retyped = FieldSchema::parse(&[("size", "real"), ("kind", "text")]).unwrap();
        let err = Store::open(&path, retyped, &CacheConfig::default()).unwrap_err();
        assert!(matches!(err, CacheError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_missing_cascade_detected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.sqlite");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE files (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    path TEXT NOT NULL UNIQUE,
                    last_modified INTEGER NOT NULL,
                    content_hash TEXT NOT NULL
                );
                CREATE TABLE indices (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    size INTEGER,
                    kind TEXT,
                    file_id INTEGER NOT NULL
                );",
            )
            .unwrap();
        }

        let err = Store::open(&path, schema(), &CacheConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            CacheError::SchemaMismatch { ref table, .. } if table == INDICES_TABLE
        ));
    }

    #[test]
    fn test_unwritable_location_is_unavailable() {
        let temp = TempDir::new().unwrap();
        // A directory where the store file should be cannot be opened as a database
        let path = temp.path().join("cache.sqlite");
        std::fs::create_dir(&path).unwrap();

        let err = Store::open(&path, schema(), &CacheConfig::default()).unwrap_err();
        // SQLite reports either an open failure or an I/O failure; never a silent success
        assert!(matches!(
            err,
            CacheError::StoreUnavailable { .. } | CacheError::Io { .. }
        ));
    }

    #[test]
    fn test_replace_and_cascade_delete() {
        let temp = TempDir::new().unwrap();
        let mut store = open(&temp.path().join("cache.sqlite"));

        let id = store
            .insert_file(
                "/a.txt",
                10,
                "h1",
                &[vec![1.into(), "a".into()], vec![2.into(), "b".into()]],
            )
            .unwrap();
        assert_eq!(count(&store, INDICES_TABLE), 2);

        store
            .replace_file(id, 20, "h2", &[vec![3.into(), "c".into()]])
            .unwrap();
        assert_eq!(count(&store, INDICES_TABLE), 1);
        let rec = store.load_files().unwrap().remove("/a.txt").unwrap();
        assert_eq!(rec.last_modified, 20);
        assert_eq!(rec.content_hash, "h2");

        store.touch_file(id, 30).unwrap();
        let rec = store.load_files().unwrap().remove("/a.txt").unwrap();
        assert_eq!(rec.last_modified, 30);
        assert_eq!(rec.content_hash, "h2");

        store.delete_file(id).unwrap();
        assert_eq!(count(&store, FILES_TABLE), 0);
        assert_eq!(count(&store, INDICES_TABLE), 0);
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let temp = TempDir::new().unwrap();
        let mut store = open(&temp.path().join("cache.sqlite"));

        store.insert_file("/a.txt", 1, "h", &[]).unwrap();
        assert!(store.insert_file("/a.txt", 2, "h", &[]).is_err());
        assert_eq!(count(&store, FILES_TABLE), 1);
    }

    #[test]
    fn test_delete_all_files() {
        let temp = TempDir::new().unwrap();
        let mut store = open(&temp.path().join("cache.sqlite"));
        store.insert_file("/a.txt", 1, "h", &[vec![1.into(), Value::Null]]).unwrap();
        store.insert_file("/b.txt", 1, "h", &[vec![2.into(), Value::Null]]).unwrap();

        assert_eq!(store.delete_all_files().unwrap(), 2);
        assert_eq!(count(&store, INDICES_TABLE), 0);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("size"), "\"size\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
