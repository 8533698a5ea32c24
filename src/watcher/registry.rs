//! Bookkeeping for a watch session.
//!
//! Tracks which directories carry a watch and which directories are known
//! unit roots, and maps event paths back to the unit that owns them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Watched directories and known unit roots for one cache root.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    /// Directories with a registered watch.
    watched: HashSet<PathBuf>,
    /// Unit roots seen so far, watched or not.
    units: HashSet<PathBuf>,
}

impl WatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a watched directory. Returns `false` if it was already known.
    pub fn add_watched(&mut self, dir: PathBuf) -> bool {
        self.watched.insert(dir)
    }

    /// Record a unit root. Returns `false` if it was already known.
    pub fn add_unit(&mut self, unit: PathBuf) -> bool {
        self.units.insert(unit)
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    /// The nearest known unit root at or above `path`.
    pub fn owning_unit(&self, path: &Path) -> Option<&Path> {
        path.ancestors()
            .find_map(|ancestor| self.units.get(ancestor).map(PathBuf::as_path))
    }

    /// Get count of watched directories.
    pub fn watch_count(&self) -> usize {
        self.watched.len()
    }

    /// Get count of known unit roots.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_deduplicates() {
        let mut registry = WatchRegistry::new();

        assert!(registry.add_watched(PathBuf::from("/build/00")));
        assert!(!registry.add_watched(PathBuf::from("/build/00")));
        assert!(registry.add_unit(PathBuf::from("/mod/a@v1.0.0")));
        assert!(!registry.add_unit(PathBuf::from("/mod/a@v1.0.0")));

        assert_eq!(registry.watch_count(), 1);
        assert_eq!(registry.unit_count(), 1);
        assert!(registry.is_watched(Path::new("/build/00")));
        assert_eq!(
            registry.owning_unit(Path::new("/mod/a@v1.0.0")),
            Some(Path::new("/mod/a@v1.0.0"))
        );
    }

    #[test]
    fn test_owning_unit_walks_ancestors() {
        let mut registry = WatchRegistry::new();
        registry.add_unit(PathBuf::from("/mod/example.com/pkg@v1.2.3"));

        assert_eq!(
            registry.owning_unit(Path::new("/mod/example.com/pkg@v1.2.3/go.mod")),
            Some(Path::new("/mod/example.com/pkg@v1.2.3"))
        );
        assert_eq!(
            registry.owning_unit(Path::new("/mod/example.com/pkg@v1.2.3")),
            Some(Path::new("/mod/example.com/pkg@v1.2.3"))
        );
        assert_eq!(
            registry.owning_unit(Path::new("/mod/example.com/other@v1.0.0/go.mod")),
            None
        );
    }
}
