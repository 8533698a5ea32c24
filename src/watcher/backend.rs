//! Capability interface for filesystem notification backends.
//!
//! The watch session only needs four things from a backend: register a
//! watch, a stream of events, a stream of errors, and a way to release
//! everything. Keeping that surface small lets the session drive either
//! the OS watcher or a scripted backend in tests.

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use tokio::sync::mpsc;

use super::WatchError;

bitflags! {
    /// Event classes a watch is interested in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        /// An existing entry was opened, read or touched.
        const ACCESS = 1 << 0;
        /// An entry appeared, by creation or by being moved in.
        const CREATE = 1 << 1;
    }
}

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Accessed,
    Created { is_dir: bool },
}

impl FsEventKind {
    /// The mask bit a watch needs for this event to be delivered.
    pub fn mask(&self) -> EventMask {
        match self {
            Self::Accessed => EventMask::ACCESS,
            Self::Created { .. } => EventMask::CREATE,
        }
    }
}

/// A single event on a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

impl FsEvent {
    pub fn accessed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FsEventKind::Accessed,
        }
    }

    pub fn created(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            kind: FsEventKind::Created { is_dir },
        }
    }

    /// Whether this event reports a newly created directory.
    pub fn is_new_dir(&self) -> bool {
        matches!(self.kind, FsEventKind::Created { is_dir: true })
    }
}

/// Receiving ends of a backend's delivery channels.
///
/// Both channels are unbounded so the backend never has to drop or block
/// on delivery. Each stream ends once the backend has released its
/// resources after [`WatchBackend::close`].
#[derive(Debug)]
pub struct EventStreams {
    pub events: mpsc::UnboundedReceiver<FsEvent>,
    pub errors: mpsc::UnboundedReceiver<WatchError>,
}

/// Sending ends matching [`EventStreams`], held by backends.
#[derive(Debug, Clone)]
pub struct EventSinks {
    pub events: mpsc::UnboundedSender<FsEvent>,
    pub errors: mpsc::UnboundedSender<WatchError>,
}

/// Create a connected sink/stream pair.
pub fn event_channel() -> (EventSinks, EventStreams) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    (
        EventSinks {
            events: event_tx,
            errors: error_tx,
        },
        EventStreams {
            events: event_rx,
            errors: error_rx,
        },
    )
}

/// A filesystem notification backend.
pub trait WatchBackend: Send {
    /// Register interest in `mask` events on the directory `path`.
    ///
    /// Registering a path twice returns [`WatchError::AlreadyWatched`].
    fn add_watch(&mut self, path: &Path, mask: EventMask) -> Result<(), WatchError>;

    /// Hand out the delivery streams. Returns `None` after the first call.
    fn take_streams(&mut self) -> Option<EventStreams>;

    /// Release every watch and the underlying OS handle.
    ///
    /// After this returns the backend delivers nothing new; the streams
    /// end once in-flight deliveries have drained. Idempotent.
    fn close(&mut self);
}

impl<B: WatchBackend + ?Sized> WatchBackend for Box<B> {
    fn add_watch(&mut self, path: &Path, mask: EventMask) -> Result<(), WatchError> {
        (**self).add_watch(path, mask)
    }

    fn take_streams(&mut self) -> Option<EventStreams> {
        (**self).take_streams()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
