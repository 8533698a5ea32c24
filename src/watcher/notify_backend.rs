//! `notify`-based backend.
//!
//! Each registered directory gets one non-recursive OS watch. Events are
//! filtered against the mask of the directory that reported them and
//! forwarded on unbounded channels from notify's delivery thread.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;

use super::backend::{
    EventMask, EventSinks, EventStreams, FsEvent, FsEventKind, WatchBackend, event_channel,
};
use super::error::WatchError;

type MaskTable = Arc<RwLock<HashMap<PathBuf, EventMask>>>;

/// Backend driving the platform's recommended notify watcher.
pub struct NotifyBackend {
    /// Dropped on close, which stops notify's thread and closes the OS handle.
    watcher: Option<RecommendedWatcher>,
    /// Watched directory -> interest mask, shared with the delivery thread.
    masks: MaskTable,
    streams: Option<EventStreams>,
}

impl NotifyBackend {
    pub fn new() -> Result<Self, WatchError> {
        let (sinks, streams) = event_channel();
        let masks: MaskTable = Arc::default();

        let handler_masks = Arc::clone(&masks);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            dispatch(res, &handler_masks, &sinks);
        })?;

        Ok(Self {
            watcher: Some(watcher),
            masks,
            streams: Some(streams),
        })
    }

    /// Number of directories currently registered.
    pub fn watch_count(&self) -> usize {
        self.masks.read().len()
    }
}

impl WatchBackend for NotifyBackend {
    fn add_watch(&mut self, path: &Path, mask: EventMask) -> Result<(), WatchError> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: "watcher is closed".to_string(),
            });
        };

        {
            let mut masks = self.masks.write();
            if masks.contains_key(path) {
                return Err(WatchError::AlreadyWatched {
                    path: path.to_path_buf(),
                });
            }
            // Registered before the OS watch so the first events pass the filter.
            masks.insert(path.to_path_buf(), mask);
        }

        if let Err(e) = watcher.watch(path, RecursiveMode::NonRecursive) {
            self.masks.write().remove(path);
            return Err(WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }

    fn take_streams(&mut self) -> Option<EventStreams> {
        self.streams.take()
    }

    fn close(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            crate::debug_event!("watch", "closing", "{} watches", self.watch_count());
            drop(watcher);
        }
    }
}

impl Drop for NotifyBackend {
    fn drop(&mut self) {
        self.close();
    }
}

/// Translate one notify callback into backend deliveries.
fn dispatch(res: notify::Result<Event>, masks: &MaskTable, sinks: &EventSinks) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            let _ = sinks.errors.send(WatchError::EventError {
                details: e.to_string(),
            });
            return;
        }
    };

    if event.need_rescan() {
        let _ = sinks.errors.send(WatchError::EventsLost {
            details: "kernel event queue overflowed".to_string(),
        });
        return;
    }

    // A two-path rename reports [from, to]; only the destination is new.
    let paths: &[PathBuf] = match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().map(std::slice::from_ref).unwrap_or(&[])
        }
        _ => &event.paths,
    };

    let masks = masks.read();
    for path in paths {
        let Some(kind) = translate(&event.kind, path) else {
            continue;
        };
        let interested = masks
            .get(path)
            .or_else(|| path.parent().and_then(|parent| masks.get(parent)))
            .is_some_and(|mask| mask.contains(kind.mask()));
        if interested {
            let _ = sinks.events.send(FsEvent {
                path: path.clone(),
                kind,
            });
        }
    }
}

fn translate(kind: &EventKind, path: &Path) -> Option<FsEventKind> {
    match kind {
        EventKind::Access(_) => Some(FsEventKind::Accessed),
        EventKind::Create(CreateKind::Folder) => Some(FsEventKind::Created { is_dir: true }),
        EventKind::Create(CreateKind::File) => Some(FsEventKind::Created { is_dir: false }),
        EventKind::Create(_) => Some(FsEventKind::Created {
            is_dir: path.is_dir(),
        }),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            Some(FsEventKind::Created {
                is_dir: path.is_dir(),
            })
        }
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Metadata(_) | ModifyKind::Any) => {
            Some(FsEventKind::Accessed)
        }
        _ => None,
    }
}
