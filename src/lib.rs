//! fileinfo-cache: a persistent, incrementally synchronized cache of per-file records
//!
//! Callers declare a field schema and register file types, each with a
//! locator (which files belong to it) and an extractor (which rows to read
//! from one file). The cache keeps one SQLite store holding a record per file
//! and the rows extracted from it, and re-extracts only files whose content
//! actually changed since the last pass.
//!
//! # Architecture
//!
//! - **Store**: builds and validates the two-table layout; row-level writes
//! - **Reconcile**: compares locator output with stored fingerprints (mtime,
//!   then blake3 hash) and applies the minimal set of writes
//! - **Registry**: maps file-type tags to locator and extractor capabilities
//! - **Query**: read-only projections joining records with their file path
//!
//! # Example Usage
//!
//! ```no_run
//! use fileinfo_cache::{ExtractionRegistry, FieldSchema, FileInfoCache, GlobLocator, Value};
//! use std::path::Path;
//!
//! let schema = FieldSchema::parse(&[("size", "integer"), ("kind", "text")]).unwrap();
//!
//! let mut registry = ExtractionRegistry::new();
//! registry
//!     .register(
//!         "doc",
//!         GlobLocator::new("data", &["**/*.txt"]).unwrap(),
//!         |path: &Path| -> anyhow::Result<Vec<Vec<Value>>> {
//!             let size = std::fs::metadata(path)?.len() as i64;
//!             Ok(vec![vec![size.into(), "text".into()]])
//!         },
//!     )
//!     .unwrap();
//!
//! let mut cache = FileInfoCache::open("cache/files.sqlite", schema, registry).unwrap();
//! for record in cache.list_all().unwrap() {
//!     println!("{} {:?}", record.path, record.get("size"));
//! }
//!
//! // Later, after files changed on disk
//! let summary = cache.synchronize().unwrap();
//! println!("{}", summary);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod locator;
pub mod models;
pub mod progress;
pub mod query;
pub mod reconcile;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheOptions, FileInfoCache};
pub use config::{CacheConfig, SyncMode};
pub use error::{CacheError, CacheResult};
pub use locator::GlobLocator;
pub use models::{CacheStats, Field, FieldSchema, FieldType, FileRecord, IndexRecord, Value};
pub use progress::{ProgressBarObserver, SyncObserver};
pub use reconcile::{FailureKind, FileFailure, SyncSummary};
pub use registry::{ExtractionRegistry, Extractor, FileType, Locator};
pub use store::Store;
