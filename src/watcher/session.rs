//! Watch session: observe one cache root until cancelled.
//!
//! The session installs watches over the cache, records every path the
//! toolchain touches into a [`UsageSet`], and on cancellation releases the
//! backend before handing the set back. Classification and accumulation
//! are backend-agnostic; see [`WatchBackend`].

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::cache::classifier::{classify, has_manifest};
use crate::cache::{CacheKind, CacheRoot, ModuleEntry, ModuleWalk, UsageSet};

use super::backend::{EventMask, EventStreams, FsEvent, FsEventKind, WatchBackend};
use super::error::WatchError;
use super::notify_backend::NotifyBackend;
use super::registry::WatchRegistry;

/// Mask for dependency unit roots and build-cache directories.
pub const USAGE_MASK: EventMask = EventMask::ACCESS.union(EventMask::CREATE);

/// Mask for module-cache directories that are not units. Only creations
/// matter there: a unit extracted mid-session is a used unit.
pub const INTERIOR_MASK: EventMask = EventMask::CREATE;

/// Default upper bound on waiting for a backend to release its resources.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Watch `root` with the platform backend until `cancel` fires.
pub async fn watch(
    root: CacheRoot,
    cancel: CancellationToken,
    close_timeout: Duration,
) -> Result<UsageSet, WatchError> {
    let backend = NotifyBackend::new()?;
    WatchSession::new(root, backend)
        .close_timeout(close_timeout)
        .run(cancel)
        .await
}

/// A directory to watch, found while walking the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WatchTarget {
    path: PathBuf,
    mask: EventMask,
    unit: bool,
}

/// One watch session bound to one cache root and one backend.
pub struct WatchSession<B: WatchBackend> {
    root: CacheRoot,
    backend: B,
    registry: WatchRegistry,
    usage: UsageSet,
    close_timeout: Duration,
    /// Cleared once shutdown starts; no new watches after that.
    extending: bool,
}

impl<B: WatchBackend> WatchSession<B> {
    pub fn new(root: CacheRoot, backend: B) -> Self {
        Self {
            root,
            backend,
            registry: WatchRegistry::new(),
            usage: UsageSet::new(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            extending: true,
        }
    }

    /// Set how long shutdown waits for the backend to drain.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Run the session to completion.
    ///
    /// Returns once `cancel` fires and the backend has been closed. The
    /// backend is closed on every path out, including errors.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<UsageSet, WatchError> {
        let Some(mut streams) = self.backend.take_streams() else {
            self.backend.close();
            return Err(WatchError::InitFailed {
                reason: "backend streams were already taken".to_string(),
            });
        };

        let outcome = self.observe(&mut streams, &cancel).await;
        self.shutdown(&mut streams).await;

        match outcome {
            Ok(()) => {
                crate::log_event!(
                    "watch",
                    "stopped",
                    "{} used entries in {} {}",
                    self.usage.len(),
                    self.root.kind(),
                    self.root.path().display()
                );
                Ok(self.usage)
            }
            Err(e) => Err(e),
        }
    }

    async fn observe(
        &mut self,
        streams: &mut EventStreams,
        cancel: &CancellationToken,
    ) -> Result<(), WatchError> {
        crate::log_event!(
            "watch",
            "creating watches",
            "{} {}",
            self.root.kind(),
            self.root.path().display()
        );

        let root = self.root.clone();
        let targets = tokio::task::spawn_blocking(move || discover(&root))
            .await
            .map_err(|e| WatchError::InitFailed {
                reason: format!("cache walk task failed: {e}"),
            })??;

        for target in targets {
            if target.unit {
                self.registry.add_unit(target.path.clone());
            }
            self.install(target.path, target.mask)?;
        }

        crate::log_event!(
            "watch",
            "watching",
            "{} directories ({} units) in {}",
            self.registry.watch_count(),
            self.registry.unit_count(),
            self.root.path().display()
        );

        loop {
            tokio::select! {
                event = streams.events.recv() => match event {
                    Some(event) => self.handle_event(event)?,
                    None => return Err(WatchError::ChannelClosed { stream: "event" }),
                },
                err = streams.errors.recv() => match err {
                    Some(e) if e.is_fatal() => return Err(e),
                    Some(e) => tracing::error!("[watch] file watcher: {e}"),
                    None => return Err(WatchError::ChannelClosed { stream: "error" }),
                },
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    /// Close the backend and drain whatever it had already delivered.
    async fn shutdown(&mut self, streams: &mut EventStreams) {
        self.extending = false;
        self.backend.close();

        let timeout = self.close_timeout;
        let drain = async {
            while let Some(event) = streams.events.recv().await {
                // Extension is off, so handling only records.
                let _ = self.handle_event(event);
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!(
                "[watch] watcher for {} did not shut down within {timeout:?}",
                self.root.path().display()
            );
        }
    }

    fn handle_event(&mut self, event: FsEvent) -> Result<(), WatchError> {
        crate::debug_event!(
            "watch",
            "event",
            "path={} created={}",
            event.path.display(),
            matches!(event.kind, FsEventKind::Created { .. })
        );

        match self.root.kind() {
            CacheKind::Build => {
                let new_dir = event.is_new_dir();
                self.usage.record(event.path.clone());
                if new_dir {
                    self.extend(event.path)?;
                }
                Ok(())
            }
            CacheKind::Module => self.handle_module_event(event),
        }
    }

    fn handle_module_event(&mut self, event: FsEvent) -> Result<(), WatchError> {
        if let Some(unit) = self.registry.owning_unit(&event.path) {
            let unit = unit.to_path_buf();
            self.usage.record(unit);
            return Ok(());
        }

        let FsEventKind::Created { is_dir } = event.kind else {
            return Ok(());
        };
        let Some(name) = event.path.file_name() else {
            return Ok(());
        };

        let sibling = event
            .path
            .parent()
            .is_some_and(|parent| parent != self.root.path() && has_manifest(parent));
        let interior = is_dir && is_interior_name(name);
        match classify(&event.path, is_dir, name, sibling) {
            Some(unit) if unit != self.root.path() => {
                crate::debug_event!("watch", "new unit", "{}", unit.display());
                self.registry.add_unit(unit.clone());
                self.usage.record(unit);
                Ok(())
            }
            _ if interior => self.extend(event.path),
            _ => Ok(()),
        }
    }

    /// Watch a directory that appeared after the initial walk, then pick
    /// up anything created inside it before the watch was in place.
    fn extend(&mut self, dir: PathBuf) -> Result<(), WatchError> {
        if !self.extending || self.registry.is_watched(&dir) {
            return Ok(());
        }

        let mask = match self.root.kind() {
            CacheKind::Build => USAGE_MASK,
            CacheKind::Module => INTERIOR_MASK,
        };
        match self.install(dir.clone(), mask) {
            Ok(()) => {}
            // Gone already, so there is nothing under it to keep.
            Err(WatchError::PathWatchFailed { .. }) if !dir.is_dir() => return Ok(()),
            Err(e) => return Err(e),
        }

        self.catch_up(&dir)
    }

    fn catch_up(&mut self, dir: &Path) -> Result<(), WatchError> {
        match self.root.kind() {
            CacheKind::Build => {
                let entries: Vec<_> = WalkDir::new(dir)
                    .min_depth(1)
                    .max_depth(1)
                    .follow_links(false)
                    .into_iter()
                    .filter_map(Result::ok)
                    .collect();
                for entry in entries {
                    let is_dir = entry.file_type().is_dir();
                    let path = entry.into_path();
                    self.usage.record(path.clone());
                    if is_dir {
                        self.extend(path)?;
                    }
                }
            }
            CacheKind::Module => {
                let entries: Vec<_> = ModuleWalk::new(dir).filter_map(Result::ok).collect();
                for entry in entries {
                    match entry {
                        ModuleEntry::Unit(unit) => {
                            self.registry.add_unit(unit.clone());
                            self.usage.record(unit);
                        }
                        ModuleEntry::Interior(path) => {
                            if path.file_name().is_some_and(is_interior_name) {
                                self.extend(path)?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn install(&mut self, path: PathBuf, mask: EventMask) -> Result<(), WatchError> {
        if self.registry.is_watched(&path) {
            return Ok(());
        }

        match self.backend.add_watch(&path, mask) {
            Ok(()) => {
                crate::debug_event!("watch", "added watch", "{}", path.display());
            }
            Err(WatchError::AlreadyWatched { .. }) => {
                crate::debug_event!("watch", "already watched", "{}", path.display());
            }
            Err(e) => return Err(e),
        }

        self.registry.add_watched(path);
        Ok(())
    }
}

/// Interior module-cache directories are watched for creations; names
/// with `@` that did not classify as units (e.g. extraction temp
/// directories, `@v` download listings) are not.
fn is_interior_name(name: &OsStr) -> bool {
    !name.to_string_lossy().contains('@')
}

/// Walk the cache once and list every directory that needs a watch.
fn discover(root: &CacheRoot) -> Result<Vec<WatchTarget>, WatchError> {
    let mut targets = Vec::new();

    match root.kind() {
        CacheKind::Module => {
            ensure_dir(root.path())?;
            targets.push(WatchTarget {
                path: root.path().to_path_buf(),
                mask: INTERIOR_MASK,
                unit: false,
            });
            for entry in ModuleWalk::new(root.path()) {
                match entry {
                    Ok(ModuleEntry::Unit(path)) => targets.push(WatchTarget {
                        path,
                        mask: USAGE_MASK,
                        unit: true,
                    }),
                    Ok(ModuleEntry::Interior(path)) => {
                        if path.file_name().is_some_and(is_interior_name) {
                            targets.push(WatchTarget {
                                path,
                                mask: INTERIOR_MASK,
                                unit: false,
                            });
                        }
                    }
                    Err(e) if is_vanished(&e) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        CacheKind::Build => {
            for entry in WalkDir::new(root.path()).follow_links(false) {
                match entry {
                    Ok(entry) if entry.file_type().is_dir() => targets.push(WatchTarget {
                        path: entry.into_path(),
                        mask: USAGE_MASK,
                        unit: false,
                    }),
                    Ok(_) => {}
                    Err(e) if is_vanished(&e) && e.depth() > 0 => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(targets)
}

fn ensure_dir(path: &Path) -> Result<(), WatchError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(WatchError::WalkFailed {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        }),
        Err(e) => Err(WatchError::WalkFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn is_vanished(e: &walkdir::Error) -> bool {
    e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_module_targets() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let unit = root.join("example.com/pkg@v1.2.3");
        fs::create_dir_all(unit.join("inner")).unwrap();
        fs::write(unit.join("go.mod"), "module example.com/pkg\n").unwrap();
        fs::create_dir_all(root.join("cache/download/example.com/pkg/@v")).unwrap();

        let targets = discover(&CacheRoot::module(root)).unwrap();

        let units: Vec<_> = targets.iter().filter(|t| t.unit).collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].path, unit);
        assert_eq!(units[0].mask, USAGE_MASK);

        assert!(targets.iter().any(|t| t.path == root && t.mask == INTERIOR_MASK));
        assert!(!targets.iter().any(|t| t.path == unit.join("inner")));
        assert!(!targets.iter().any(|t| t.path.ends_with("@v")));
    }

    #[test]
    fn test_discover_build_targets_are_directories() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("00")).unwrap();
        fs::create_dir_all(root.join("01")).unwrap();
        fs::write(root.join("00/0011-a"), "x").unwrap();
        fs::write(root.join("README"), "x").unwrap();

        let targets = discover(&CacheRoot::build(root)).unwrap();

        let mut paths: Vec<_> = targets.into_iter().map(|t| t.path).collect();
        paths.sort();
        assert_eq!(paths, vec![root.to_path_buf(), root.join("00"), root.join("01")]);
    }

    #[test]
    fn test_discover_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");

        assert!(matches!(
            discover(&CacheRoot::module(&missing)),
            Err(WatchError::WalkFailed { .. })
        ));
        assert!(discover(&CacheRoot::build(&missing)).is_err());
    }
}
