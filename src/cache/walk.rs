//! Single-pass traversal of a module cache.
//!
//! Both the watch session and the prune walker see the module cache the
//! same way: a tree of interior directories whose leaves are opaque
//! dependency units. `ModuleWalk` yields each unit root exactly once and
//! never descends into it.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use super::classifier::{classify, has_manifest};

/// One step of a module-cache traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEntry {
    /// A directory that is not part of any unit found so far.
    Interior(PathBuf),
    /// The root of a dependency unit. Its subtree is not visited.
    Unit(PathBuf),
}

/// Iterator over the interior directories and unit roots below `root`.
///
/// Files are visited before directories within each directory, so a
/// manifest claims its directory as a unit before any nested directory
/// (which may carry a nested manifest of its own) is entered. The root
/// itself is never yielded and never treated as a unit.
pub struct ModuleWalk {
    root: PathBuf,
    inner: walkdir::IntoIter,
    /// Last directory checked for a manifest, with the result.
    manifest_checked: Option<(PathBuf, bool)>,
}

impl ModuleWalk {
    pub fn new(root: &Path) -> Self {
        let inner = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by(files_first)
            .into_iter();

        Self {
            root: root.to_path_buf(),
            inner,
            manifest_checked: None,
        }
    }

    fn manifest_beside(&mut self, entry: &DirEntry) -> bool {
        let Some(parent) = entry.path().parent() else {
            return false;
        };
        if parent == self.root {
            return false;
        }
        if let Some((dir, found)) = &self.manifest_checked {
            if dir == parent {
                return *found;
            }
        }
        let found = has_manifest(parent);
        self.manifest_checked = Some((parent.to_path_buf(), found));
        found
    }
}

fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

impl Iterator for ModuleWalk {
    type Item = Result<ModuleEntry, walkdir::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };

            let is_dir = entry.file_type().is_dir();
            let sibling = self.manifest_beside(&entry);

            match classify(entry.path(), is_dir, entry.file_name(), sibling) {
                Some(unit) if unit != self.root => {
                    // Stop at the unit: a directory entry must not be
                    // entered, and when the unit is the entry's parent the
                    // rest of the parent is skipped as well.
                    if is_dir {
                        self.inner.skip_current_dir();
                    }
                    if unit != entry.path() {
                        self.inner.skip_current_dir();
                    }
                    return Some(Ok(ModuleEntry::Unit(unit)));
                }
                _ if is_dir => return Some(Ok(ModuleEntry::Interior(entry.into_path()))),
                _ => continue,
            }
        }
    }
}
