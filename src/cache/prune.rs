//! Deletes every cache entry that is absent from a usage set.
//!
//! Pruning is best-effort. Entries that vanish mid-walk are expected and
//! skipped silently; any other failure is logged, counted, and the walk
//! moves on to the next entry.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use super::walk::{ModuleEntry, ModuleWalk};
use super::{CacheKind, CacheRoot, PruneTally, UsageSet};

/// Walk `root` once and remove everything not recorded in `usage`.
///
/// The root directory itself is never removed. Blocking; callers in async
/// contexts run it on a blocking thread.
pub fn prune(root: &CacheRoot, usage: &UsageSet) -> PruneTally {
    let mut tally = PruneTally::new(root.kind());

    match root.kind() {
        CacheKind::Module => prune_module_cache(root.path(), usage, &mut tally),
        CacheKind::Build => prune_build_cache(root.path(), usage, &mut tally),
    }

    tally
}

fn prune_module_cache(root: &Path, usage: &UsageSet, tally: &mut PruneTally) {
    for entry in ModuleWalk::new(root) {
        let unit = match entry {
            Ok(ModuleEntry::Unit(unit)) => unit,
            Ok(ModuleEntry::Interior(_)) => continue,
            Err(e) => {
                walk_failed(root, e, tally);
                continue;
            }
        };

        if usage.contains(&unit) {
            continue;
        }

        match remove_unit(&unit) {
            Ok(()) => {
                crate::debug_event!("prune", "deleted unit", "{}", unit.display());
                tally.deleted += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    "[prune] deleting directory {} from module cache: {e}",
                    unit.display()
                );
                tally.failed += 1;
            }
        }
    }
}

fn prune_build_cache(root: &Path, usage: &UsageSet, tally: &mut PruneTally) {
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                walk_failed(root, e, tally);
                continue;
            }
        };

        // Directories stay, even when they end up empty.
        if entry.file_type().is_dir() || usage.contains(entry.path()) {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => {
                crate::debug_event!("prune", "deleted file", "{}", entry.path().display());
                tally.deleted += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    "[prune] deleting file {} from build cache: {e}",
                    entry.path().display()
                );
                tally.failed += 1;
            }
        }
    }
}

fn walk_failed(root: &Path, e: walkdir::Error, tally: &mut PruneTally) {
    if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) {
        return;
    }
    let at = e.path().unwrap_or(root).display().to_string();
    tracing::warn!("[prune] walking {} at {at}: {e}", root.display());
    tally.failed += 1;
}

/// Make a unit writable and remove it.
///
/// Extracted modules are read-only on disk, so directories need their
/// write bit back before their contents can be unlinked.
fn remove_unit(unit: &Path) -> io::Result<()> {
    make_writable(unit)?;
    fs::remove_dir_all(unit)
}

fn make_writable(unit: &Path) -> io::Result<()> {
    for entry in WalkDir::new(unit).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                continue;
            }
            Err(e) => return Err(io::Error::other(e)),
        };
        if entry.file_type().is_symlink() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                continue;
            }
            Err(e) => return Err(io::Error::other(e)),
        };

        let permissions = writable(metadata.permissions(), entry.file_type().is_dir());
        match fs::set_permissions(entry.path(), permissions) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn writable(permissions: fs::Permissions, is_dir: bool) -> fs::Permissions {
    use std::os::unix::fs::PermissionsExt;

    let owner = if is_dir { 0o700 } else { 0o600 };
    fs::Permissions::from_mode(permissions.mode() | owner)
}

#[cfg(not(unix))]
fn writable(mut permissions: fs::Permissions, _is_dir: bool) -> fs::Permissions {
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    permissions
}
