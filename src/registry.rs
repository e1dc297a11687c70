//! Extraction registry: which files belong to the cache and what to read from them
//!
//! Every file type is registered under a tag together with two capabilities:
//! a [`Locator`] that lists the files currently belonging to the tag, and an
//! [`Extractor`] that turns one file into zero or more rows of [`Value`]s in
//! field-schema order. Closures implement both traits, so simple cases need
//! no dedicated types (closures need an explicit return type):
//!
//! ```no_run
//! use fileinfo_cache::{ExtractionRegistry, Value};
//! use std::path::{Path, PathBuf};
//!
//! let mut registry = ExtractionRegistry::new();
//! registry
//!     .register(
//!         "doc",
//!         || -> anyhow::Result<Vec<PathBuf>> { Ok(vec![PathBuf::from("a.txt")]) },
//!         |path: &Path| -> anyhow::Result<Vec<Vec<Value>>> {
//!             let len = std::fs::metadata(path)?.len() as i64;
//!             Ok(vec![vec![Value::Integer(len), Value::from("text")]])
//!         },
//!     )
//!     .unwrap();
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::{CacheError, CacheResult};
use crate::models::Value;

/// Produces the current set of paths belonging to one file type
///
/// Implementations should be free of side effects; they may be slow.
pub trait Locator {
    fn locate(&self) -> Result<Vec<PathBuf>>;
}

/// Produces index rows from one file's content
///
/// Each row must match the cache's field schema in length and type.
pub trait Extractor {
    fn extract(&self, path: &Path) -> Result<Vec<Vec<Value>>>;
}

impl<F> Locator for F
where
    F: Fn() -> Result<Vec<PathBuf>>,
{
    fn locate(&self) -> Result<Vec<PathBuf>> {
        self()
    }
}

impl<F> Extractor for F
where
    F: Fn(&Path) -> Result<Vec<Vec<Value>>>,
{
    fn extract(&self, path: &Path) -> Result<Vec<Vec<Value>>> {
        self(path)
    }
}

/// A registered file type
pub struct FileType {
    tag: String,
    locator: Box<dyn Locator>,
    extractor: Box<dyn Extractor>,
}

impl FileType {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn locator(&self) -> &dyn Locator {
        self.locator.as_ref()
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }
}

impl fmt::Debug for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileType").field("tag", &self.tag).finish()
    }
}

/// Ordered mapping from file-type tag to its locator and extractor
#[derive(Debug, Default)]
pub struct ExtractionRegistry {
    file_types: Vec<FileType>,
}

impl ExtractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file type
    ///
    /// Tags are unique; registration order decides which tag processes a
    /// path that more than one locator reports.
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        locator: impl Locator + 'static,
        extractor: impl Extractor + 'static,
    ) -> CacheResult<&mut Self> {
        let tag = tag.into();

        if tag.trim().is_empty() {
            return Err(CacheError::InvalidTag(tag));
        }
        if self.get(&tag).is_some() {
            return Err(CacheError::DuplicateTag(tag));
        }

        log::debug!("Registered file type '{}'", tag);
        self.file_types.push(FileType {
            tag,
            locator: Box::new(locator),
            extractor: Box::new(extractor),
        });
        Ok(self)
    }

    /// Builder-style variant of [`register`](Self::register)
    pub fn with(
        mut self,
        tag: impl Into<String>,
        locator: impl Locator + 'static,
        extractor: impl Extractor + 'static,
    ) -> CacheResult<Self> {
        self.register(tag, locator, extractor)?;
        Ok(self)
    }

    pub fn get(&self, tag: &str) -> Option<&FileType> {
        self.file_types.iter().find(|ft| ft.tag == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileType> {
        self.file_types.iter()
    }

    pub fn tags(&self) -> Vec<&str> {
        self.file_types.iter().map(|ft| ft.tag.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.file_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_types.is_empty()
    }
}
