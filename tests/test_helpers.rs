//! Shared fixtures for the integration tests
//!
//! A [`Fixture`] owns a temporary directory, a locator whose output the test
//! controls and an extractor that counts its calls.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use filetime::FileTime;
use fileinfo_cache::{ExtractionRegistry, FieldSchema, FileInfoCache, Value};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub located: Rc<RefCell<Vec<PathBuf>>>,
    pub extractions: Rc<Cell<usize>>,
    pub failing: Rc<RefCell<HashSet<PathBuf>>>,
}

impl Fixture {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            dir: TempDir::new().unwrap(),
            located: Rc::new(RefCell::new(Vec::new())),
            extractions: Rc::new(Cell::new(0)),
            failing: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.path().join("store/cache.sqlite")
    }

    /// Write a file with a fixed mtime and report it from the locator
    pub fn add(&self, name: &str, content: &str, mtime: i64) -> PathBuf {
        let path = self.write(name, content, mtime);
        self.located.borrow_mut().push(path.clone());
        path
    }

    /// Write a file with a fixed mtime without changing locator output
    pub fn write(&self, name: &str, content: &str, mtime: i64) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).unwrap();
        set_mtime(&path, mtime);
        path
    }

    pub fn untrack(&self, path: &Path) {
        self.located.borrow_mut().retain(|p| p != path);
    }

    pub fn fail_on(&self, path: &Path) {
        self.failing.borrow_mut().insert(path.to_path_buf());
    }

    pub fn heal(&self, path: &Path) {
        self.failing.borrow_mut().remove(path);
    }

    /// Registry with one "doc" type; each non-empty line becomes a record
    pub fn registry(&self) -> ExtractionRegistry {
        let located = self.located.clone();
        let extractions = self.extractions.clone();
        let failing = self.failing.clone();

        ExtractionRegistry::new()
            .with(
                "doc",
                move || -> anyhow::Result<Vec<PathBuf>> { Ok(located.borrow().clone()) },
                move |path: &Path| -> anyhow::Result<Vec<Vec<Value>>> {
                    extractions.set(extractions.get() + 1);
                    if failing.borrow().contains(path) {
                        anyhow::bail!("cannot parse {}", path.display());
                    }
                    let content = std::fs::read_to_string(path)?;
                    Ok(content
                        .lines()
                        .filter(|l| !l.is_empty())
                        .map(|l| vec![Value::from(l.len() as i64), Value::from(l)])
                        .collect())
                },
            )
            .unwrap()
    }

    pub fn open(&self) -> FileInfoCache {
        FileInfoCache::open(self.store_path(), schema(), self.registry()).unwrap()
    }

    pub fn extraction_count(&self) -> usize {
        self.extractions.get()
    }
}

pub fn schema() -> FieldSchema {
    FieldSchema::parse(&[("size", "integer"), ("kind", "text")]).unwrap()
}

pub fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

/// The `kind` column of every record, in order
pub fn kinds(records: &[fileinfo_cache::IndexRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("kind").and_then(Value::as_str).map(str::to_string))
        .collect()
}
