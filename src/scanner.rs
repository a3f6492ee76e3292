//! Which paths under a root get indexed, and a synchronous full walk.
//!
//! A path is indexable when no component below the root starts with `.`,
//! it is no deeper than `max_depth`, it matches none of the exclude globs,
//! and its extension is on the parser's allowlist.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::WatchConfig;
use crate::parser;

pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    max_depth: usize,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(root: &Path, max_depth: usize, exclude_globs: &[String]) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            max_depth,
            exclude: build_globset(exclude_globs)?,
        })
    }

    pub fn from_config(watch: &WatchConfig) -> Result<Self> {
        Self::new(&watch.root, watch.max_depth, &watch.exclude_globs)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Same filter, walking from a different root.
    pub fn with_root(&self, root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..self.clone()
        }
    }

    /// True when `path` (under the root) should be indexed.
    pub fn accepts(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if is_hidden(relative) {
            return false;
        }
        if relative.components().count() > self.max_depth {
            return false;
        }
        if self.exclude.is_match(relative) {
            return false;
        }
        parser::is_supported(path)
    }

    /// Directories pruned during the walk.
    fn prunes_dir(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        is_hidden(relative) || (!relative.as_os_str().is_empty() && self.exclude.is_match(relative))
    }
}

/// True when any component of `relative` starts with a dot.
pub fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Every indexable file under the filter's root, sorted by path.
pub fn scan_directory(filter: &PathFilter) -> Result<Vec<PathBuf>> {
    let root = filter.root();
    if !root.is_dir() {
        bail!("scan root is not a directory: {}", root.display());
    }

    let walker = WalkDir::new(root)
        .max_depth(filter.max_depth())
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !filter.prunes_dir(e.path()));

    let mut paths = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if entry.file_type().is_file() && filter.accepts(entry.path()) {
            paths.push(entry.into_path());
        }
    }

    paths.sort();
    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
