//! The file-info cache facade
//!
//! [`FileInfoCache`] ties a store, a field schema and an extraction registry
//! together. Opening it prepares the store and runs one reconciliation pass,
//! so a freshly opened cache already reflects the filesystem. After that the
//! store only changes when [`synchronize`](FileInfoCache::synchronize) or
//! [`rebuild`](FileInfoCache::rebuild) is called.

use std::fmt;
use std::path::Path;

use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::models::{CacheStats, FieldSchema, FileRecord, IndexRecord};
use crate::progress::{ProgressBarObserver, SyncObserver};
use crate::reconcile::{self, PassKind, SyncSummary};
use crate::registry::ExtractionRegistry;
use crate::store::Store;

/// Construction options for [`FileInfoCache::open_with`]
#[derive(Default)]
pub struct CacheOptions {
    pub config: CacheConfig,
    /// Progress observer; `None` means the default terminal progress bar
    pub observer: Option<Box<dyn SyncObserver>>,
}

impl CacheOptions {
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: impl SyncObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// A persistent cache of per-file index records
pub struct FileInfoCache {
    store: Store,
    registry: ExtractionRegistry,
    observer: Option<Box<dyn SyncObserver>>,
    last_summary: SyncSummary,
}

impl FileInfoCache {
    /// Open (or create) the cache at `store_path` and synchronize it once
    pub fn open(
        store_path: impl AsRef<Path>,
        schema: FieldSchema,
        registry: ExtractionRegistry,
    ) -> CacheResult<Self> {
        Self::open_with(store_path, schema, registry, CacheOptions::default())
    }

    pub fn open_with(
        store_path: impl AsRef<Path>,
        schema: FieldSchema,
        registry: ExtractionRegistry,
        options: CacheOptions,
    ) -> CacheResult<Self> {
        let store_path = store_path.as_ref();
        log::debug!(
            "Opening file-info cache at {:?} with file types {:?}",
            store_path,
            registry.tags()
        );

        let store = Store::open(store_path, schema, &options.config)?;
        let observer = options.observer.unwrap_or_else(|| {
            Box::new(ProgressBarObserver::new(options.config.progress_threshold))
        });

        let mut cache = Self {
            store,
            registry,
            observer: Some(observer),
            last_summary: SyncSummary::default(),
        };
        cache.synchronize()?;
        Ok(cache)
    }

    /// Bring the store in line with what the locators report now
    pub fn synchronize(&mut self) -> CacheResult<&SyncSummary> {
        self.run_pass(PassKind::Incremental)
    }

    /// Drop every stored file and index record, then synchronize from scratch
    ///
    /// The locators run first; if one fails the store is left as it was.
    pub fn rebuild(&mut self) -> CacheResult<&SyncSummary> {
        self.run_pass(PassKind::Rebuild)
    }

    fn run_pass(&mut self, pass: PassKind) -> CacheResult<&SyncSummary> {
        let summary =
            reconcile::synchronize(&mut self.store, &self.registry, &mut self.observer, pass)?;
        self.last_summary = summary;
        Ok(&self.last_summary)
    }

    /// Summary of the most recent completed pass
    pub fn last_summary(&self) -> &SyncSummary {
        &self.last_summary
    }

    /// Every stored index record annotated with its owning path
    pub fn list_all(&self) -> CacheResult<Vec<IndexRecord>> {
        self.store.list_all()
    }

    /// Index records of the file at `path`; empty when untracked
    pub fn lookup(&self, path: impl AsRef<Path>) -> CacheResult<Vec<IndexRecord>> {
        self.store.lookup(path.as_ref())
    }

    pub fn tracked_files(&self) -> CacheResult<Vec<FileRecord>> {
        self.store.tracked_files()
    }

    pub fn file_record(&self, path: impl AsRef<Path>) -> CacheResult<Option<FileRecord>> {
        self.store.file_record(path.as_ref())
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        self.store.stats()
    }

    pub fn schema(&self) -> &FieldSchema {
        self.store.schema()
    }

    pub fn registry(&self) -> &ExtractionRegistry {
        &self.registry
    }

    /// Path of the backing store file
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }
}

impl fmt::Debug for FileInfoCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfoCache")
            .field("store", &self.store.path())
            .field("file_types", &self.registry.tags())
            .finish()
    }
}
