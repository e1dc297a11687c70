//! Built-in locators
//!
//! [`GlobLocator`] walks a directory tree and reports every regular file whose
//! root-relative path matches one of its glob patterns.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

use crate::error::{CacheError, CacheResult};
use crate::registry::Locator;

/// Locates files under a root directory by glob pattern
#[derive(Debug, Clone)]
pub struct GlobLocator {
    root: PathBuf,
    patterns: Vec<String>,
    matcher: GlobSet,
    follow_links: bool,
    hidden: bool,
    respect_ignore_files: bool,
}

impl GlobLocator {
    /// Create a locator matching any of `patterns` (e.g. `"**/*.mseed"`)
    /// relative to `root`
    pub fn new<S: AsRef<str>>(root: impl AsRef<Path>, patterns: &[S]) -> CacheResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern.as_ref())
                .map_err(|e| CacheError::GlobPattern(e.to_string()))?;
            builder.add(glob);
        }
        let matcher = builder
            .build()
            .map_err(|e| CacheError::GlobPattern(e.to_string()))?;

        Ok(Self {
            root: root.as_ref().to_path_buf(),
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            matcher,
            follow_links: false,
            hidden: false,
            respect_ignore_files: false,
        })
    }

    /// Follow symbolic links while walking
    pub fn follow_links(mut self, yes: bool) -> Self {
        self.follow_links = yes;
        self
    }

    /// Include hidden files and directories
    pub fn include_hidden(mut self, yes: bool) -> Self {
        self.hidden = yes;
        self
    }

    /// Honour `.gitignore` / `.ignore` files found in the tree
    pub fn respect_ignore_files(mut self, yes: bool) -> Self {
        self.respect_ignore_files = yes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Locator for GlobLocator {
    fn locate(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            anyhow::bail!("Locator root is not a directory: {}", self.root.display());
        }

        let walker = WalkBuilder::new(&self.root)
            .follow_links(self.follow_links)
            .hidden(!self.hidden)
            .git_ignore(self.respect_ignore_files)
            .git_global(self.respect_ignore_files)
            .git_exclude(self.respect_ignore_files)
            .ignore(self.respect_ignore_files)
            .parents(self.respect_ignore_files)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", self.root.display()))?;

            // Only process files (not directories)
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if self.matcher.is_match(relative) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        log::debug!(
            "Located {} files under {:?} matching {:?}",
            files.len(),
            self.root,
            self.patterns
        );
        Ok(files)
    }
}
