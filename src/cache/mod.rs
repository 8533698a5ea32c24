//! Cache roots, usage sets and prune tallies.
//!
//! A run operates on at most two caches: the module cache, whose unit of
//! retention is a whole dependency directory, and the build cache, whose
//! unit of retention is a single file.

pub mod classifier;
pub mod prune;
pub mod walk;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

pub use classifier::{MANIFEST_FILENAME, classify, is_pseudo_version, is_unit_version};
pub use prune::prune;
pub use walk::{ModuleEntry, ModuleWalk};

/// Which toolchain cache a root points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Extracted dependency source trees (`GOMODCACHE`).
    Module,
    /// Compiled action outputs addressed by content hash (`GOCACHE`).
    Build,
}

impl CacheKind {
    /// Noun used when reporting what was deleted from this cache.
    pub fn unit_noun(&self) -> &'static str {
        match self {
            Self::Module => "directories",
            Self::Build => "files",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Module => "module cache",
            Self::Build => "build cache",
        };
        write!(f, "{name}")
    }
}

/// A configured cache directory. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoot {
    kind: CacheKind,
    path: PathBuf,
}

impl CacheRoot {
    pub fn new(kind: CacheKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn module(path: impl Into<PathBuf>) -> Self {
        Self::new(CacheKind::Module, path)
    }

    pub fn build(path: impl Into<PathBuf>) -> Self {
        Self::new(CacheKind::Build, path)
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Paths observed as used during one watch session on one cache root.
///
/// Module-cache sets hold unit roots; build-cache sets hold literal
/// file paths. The set only grows while watching and is handed to the
/// prune walker by value once the session has closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageSet {
    paths: HashSet<PathBuf>,
}

impl UsageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path. Returns `true` if it was not already present.
    pub fn record(&mut self, path: impl Into<PathBuf>) -> bool {
        self.paths.insert(path.into())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for UsageSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Outcome of one prune pass over one cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneTally {
    pub kind: CacheKind,
    /// Units (module cache) or files (build cache) removed.
    pub deleted: u64,
    /// Entries that could not be removed and were left in place.
    pub failed: u64,
}

impl PruneTally {
    pub fn new(kind: CacheKind) -> Self {
        Self {
            kind,
            deleted: 0,
            failed: 0,
        }
    }
}

impl fmt::Display for PruneTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deleted {} {} from {}",
            self.deleted,
            self.kind.unit_noun(),
            self.kind
        )?;
        if self.failed > 0 {
            write!(f, " ({} could not be removed)", self.failed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_set_deduplicates() {
        let mut usage = UsageSet::new();

        assert!(usage.record("/cache/a@v1.0.0"));
        assert!(!usage.record("/cache/a@v1.0.0"));
        assert!(usage.record("/cache/b@v1.0.0"));

        assert_eq!(usage.len(), 2);
        assert!(usage.contains(Path::new("/cache/a@v1.0.0")));
        assert!(!usage.contains(Path::new("/cache/c@v1.0.0")));
    }

    #[test]
    fn test_tally_display() {
        let mut tally = PruneTally::new(CacheKind::Module);
        tally.deleted = 3;
        assert_eq!(tally.to_string(), "deleted 3 directories from module cache");

        tally.failed = 1;
        assert!(tally.to_string().ends_with("(1 could not be removed)"));
    }
}
