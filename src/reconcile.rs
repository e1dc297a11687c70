//! Reconciliation engine: bring the store in line with the filesystem
//!
//! One pass runs every locator, compares what they report with the stored
//! file records and applies the smallest set of writes:
//!
//! - unseen path: hash, extract, insert file and records
//! - same whole-second mtime: nothing (content is assumed unchanged)
//! - new mtime, same hash: update the stored mtime only
//! - new mtime, new hash: extract again and replace the file's records
//! - stored path no locator reported: delete it (records cascade)
//!
//! Each file is written in its own transaction, after extraction has
//! succeeded, so a failing extractor or unreadable file leaves that file's
//! previous state in place. Such failures are collected in the
//! [`SyncSummary`] and the pass carries on. Locator and store failures abort
//! the pass.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use strum::Display;

use crate::error::{CacheError, CacheResult};
use crate::fingerprint;
use crate::models::{FieldSchema, FileRecord, Value};
use crate::progress::SyncObserver;
use crate::registry::{ExtractionRegistry, FileType};
use crate::store::Store;

/// Why a single file could not be brought up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// The file could not be stat-ed, read or hashed
    Io,
    /// The extractor returned an error
    Extract,
    /// The extractor returned rows that do not fit the field schema
    InvalidRecord,
    /// A different path already maps to the same stored name
    PathCollision,
}

/// A per-file failure recorded during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub tag: String,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({}): {}", self.tag, self.path, self.kind, self.message)
    }
}

/// What one reconciliation pass did
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    /// Distinct paths reported by all locators
    pub observed: usize,
    /// Files seen for the first time
    pub added: usize,
    /// Files whose content changed and were re-extracted
    pub updated: usize,
    /// Files whose mtime moved but content hash did not
    pub touched: usize,
    /// Files skipped on the mtime fast path
    pub unchanged: usize,
    /// Stale file records deleted
    pub removed: usize,
    /// Extractor invocations, successful or not
    pub extractions: usize,
    /// Index records written
    pub records_written: usize,
    /// Files that could not be processed; their stored state is untouched
    pub failures: Vec<FileFailure>,
    /// Wall-clock time of the pass
    pub duration: Duration,
}

impl SyncSummary {
    /// True when every observed file was processed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when the pass wrote anything to the store
    pub fn has_changes(&self) -> bool {
        self.added + self.updated + self.touched + self.removed > 0
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Added(records) => {
                self.added += 1;
                self.records_written += records;
            }
            Outcome::Updated(records) => {
                self.updated += 1;
                self.records_written += records;
            }
            Outcome::Touched => self.touched += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} added, {} updated, {} touched, {} unchanged, {} removed, {} failed",
            self.observed,
            self.added,
            self.updated,
            self.touched,
            self.unchanged,
            self.removed,
            self.failures.len()
        )
    }
}

enum Outcome {
    Added(usize),
    Updated(usize),
    Touched,
    Unchanged,
}

enum ProcessError {
    /// The store failed; the pass cannot continue
    Store(CacheError),
    /// Only this file is affected
    File { kind: FailureKind, message: String },
}

impl From<CacheError> for ProcessError {
    fn from(err: CacheError) -> Self {
        ProcessError::Store(err)
    }
}

impl ProcessError {
    fn io(err: std::io::Error) -> Self {
        ProcessError::File {
            kind: FailureKind::Io,
            message: err.to_string(),
        }
    }
}

/// A path reported by a locator, normalized
struct Observed<'r> {
    file_type: &'r FileType,
    path: PathBuf,
    key: String,
}

/// Normalize a locator-reported path into the form stored in the cache
///
/// Paths are made absolute lexically; symlinks are not resolved. Names that
/// are not valid UTF-8 are stored lossily, so the key is only used for
/// lookups and never to reach the file on disk.
pub fn normalize_path(path: &Path) -> std::io::Result<String> {
    Ok(path_key(&std::path::absolute(path)?))
}

fn path_key(absolute: &Path) -> String {
    absolute.to_string_lossy().into_owned()
}

/// How a pass treats the records already in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassKind {
    /// Compare fingerprints and write only what changed
    Incremental,
    /// Clear every file record once the locators succeeded, then extract all files
    Rebuild,
}

/// Run one reconciliation pass
pub(crate) fn synchronize(
    store: &mut Store,
    registry: &ExtractionRegistry,
    observer: &mut Option<Box<dyn SyncObserver>>,
    pass: PassKind,
) -> CacheResult<SyncSummary> {
    let start = Instant::now();
    let mut summary = SyncSummary::default();

    // Step 1: ask every locator first so a failing one aborts before any write
    let observed = locate_all(registry, &mut summary)?;
    summary.observed = observed.len();

    if pass == PassKind::Rebuild {
        let cleared = store.delete_all_files()?;
        log::info!("Rebuilding cache: cleared {} file records", cleared);
    }

    // Step 2: everything currently stored, keyed by path
    let mut known = store.load_files()?;
    log::debug!("Loaded {} tracked files from cache", known.len());

    if let Some(obs) = observer.as_mut() {
        obs.on_start(observed.len());
    }

    // Step 3: process observed paths; whatever stays in `known` is stale
    for (i, item) in observed.iter().enumerate() {
        let result = match known.remove(&item.key) {
            None => add_file(store, item, &mut summary.extractions),
            Some(record) => refresh_file(store, item, &record, &mut summary.extractions),
        };

        match result {
            Ok(outcome) => summary.record(outcome),
            Err(ProcessError::Store(err)) => return Err(err),
            Err(ProcessError::File { kind, message }) => {
                let failure = FileFailure {
                    path: item.key.clone(),
                    tag: item.file_type.tag().to_string(),
                    kind,
                    message,
                };
                log::warn!("Failed to index {}", failure);
                summary.failures.push(failure);
            }
        }

        if let Some(obs) = observer.as_mut() {
            obs.on_file(i + 1, &item.path);
        }
    }

    // Step 4: drop files no locator reported this pass
    for record in known.into_values() {
        log::debug!("Removing stale file: {}", record.path);
        store.delete_file(record.id)?;
        summary.removed += 1;
    }

    // An idle pass leaves the store untouched, bookkeeping included
    let first_pass = store.get_meta("last_synced")?.is_none();
    if summary.has_changes() || pass == PassKind::Rebuild || first_pass {
        store.set_meta("last_synced", &chrono::Utc::now().to_rfc3339())?;
    }
    summary.duration = start.elapsed();

    if summary.is_clean() {
        log::info!("Cache synchronized: {}", summary);
    } else {
        log::warn!("Cache synchronized with failures: {}", summary);
    }

    if let Some(obs) = observer.as_mut() {
        obs.on_finish(&summary);
    }

    Ok(summary)
}

/// Run every locator and normalize what they report
///
/// Paths that cannot be normalized, or that collide with a different path
/// once converted to a stored key, become failures in `summary`.
fn locate_all<'r>(
    registry: &'r ExtractionRegistry,
    summary: &mut SyncSummary,
) -> CacheResult<Vec<Observed<'r>>> {
    let mut observed: Vec<Observed<'r>> = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for file_type in registry.iter() {
        let paths = file_type
            .locator()
            .locate()
            .map_err(|source| CacheError::Locate {
                tag: file_type.tag().to_string(),
                source,
            })?;
        log::debug!("File type '{}': located {} files", file_type.tag(), paths.len());

        for path in paths {
            let skip = |kind: FailureKind, message: String| FileFailure {
                path: path.to_string_lossy().into_owned(),
                tag: file_type.tag().to_string(),
                kind,
                message,
            };

            let absolute = match std::path::absolute(&path) {
                Ok(absolute) => absolute,
                Err(e) => {
                    let failure = skip(FailureKind::Io, e.to_string());
                    log::warn!("Skipping {}", failure);
                    summary.failures.push(failure);
                    continue;
                }
            };
            let key = path_key(&absolute);

            match seen.get(&key) {
                Some(claimed) if *claimed == absolute => {
                    log::debug!(
                        "{} already claimed by an earlier file type, skipping for '{}'",
                        key,
                        file_type.tag()
                    );
                }
                Some(claimed) => {
                    let failure = skip(
                        FailureKind::PathCollision,
                        format!("stored name collides with {}", claimed.to_string_lossy()),
                    );
                    log::warn!("Skipping {}", failure);
                    summary.failures.push(failure);
                }
                None => {
                    seen.insert(key.clone(), absolute.clone());
                    observed.push(Observed {
                        file_type,
                        path: absolute,
                        key,
                    });
                }
            }
        }
    }

    Ok(observed)
}

fn add_file(
    store: &mut Store,
    item: &Observed<'_>,
    extractions: &mut usize,
) -> Result<Outcome, ProcessError> {
    log::debug!("New file: {}", item.key);

    let modified = fingerprint::modified_secs(&item.path).map_err(ProcessError::io)?;
    let hash = fingerprint::hash_file(&item.path).map_err(ProcessError::io)?;
    let rows = extract_rows(store.schema(), item, extractions)?;

    store.insert_file(&item.key, modified, &hash, &rows)?;
    log::debug!("  Stored {} records for {}", rows.len(), item.key);
    Ok(Outcome::Added(rows.len()))
}

fn refresh_file(
    store: &mut Store,
    item: &Observed<'_>,
    record: &FileRecord,
    extractions: &mut usize,
) -> Result<Outcome, ProcessError> {
    let modified = fingerprint::modified_secs(&item.path).map_err(ProcessError::io)?;
    if modified == record.last_modified {
        return Ok(Outcome::Unchanged);
    }

    let hash = fingerprint::hash_file(&item.path).map_err(ProcessError::io)?;
    if hash == record.content_hash {
        log::debug!("Timestamp changed but content identical: {}", item.key);
        store.touch_file(record.id, modified)?;
        return Ok(Outcome::Touched);
    }

    log::debug!("Content changed: {}", item.key);
    let rows = extract_rows(store.schema(), item, extractions)?;
    store.replace_file(record.id, modified, &hash, &rows)?;
    log::debug!("  Replaced records for {} ({} now)", item.key, rows.len());
    Ok(Outcome::Updated(rows.len()))
}

/// Run the extractor and check its rows against the schema
fn extract_rows(
    schema: &FieldSchema,
    item: &Observed<'_>,
    extractions: &mut usize,
) -> Result<Vec<Vec<Value>>, ProcessError> {
    *extractions += 1;

    let rows = item
        .file_type
        .extractor()
        .extract(&item.path)
        .map_err(|e| ProcessError::File {
            kind: FailureKind::Extract,
            message: format!("{:#}", e),
        })?;

    rows.into_iter()
        .enumerate()
        .map(|(n, row)| {
            schema.check_row(&row).map_err(|message| ProcessError::File {
                kind: FailureKind::InvalidRecord,
                message: format!("record {}: {}", n, message),
            })?;
            Ok(row
                .into_iter()
                .zip(schema.fields())
                .map(|(value, field)| value.coerce(field.field_type))
                .collect())
        })
        .collect()
}
