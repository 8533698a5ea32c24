//! Filesystem watching for cache usage tracking.
//!
//! # Architecture
//!
//! ```text
//! WatchSession (one per cache root)
//!   - WatchRegistry (watched dirs, known unit roots)
//!   - UsageSet (what the build touched)
//!   - dyn WatchBackend
//!         |
//!    +----------------+
//!    |                |
//! NotifyBackend   (scripted backends in tests)
//! ```
//!
//! The module cache gets one watch per dependency unit plus create-only
//! watches on the directories between units. The build cache gets one
//! watch per directory, extended as new directories appear.

mod backend;
mod error;
mod notify_backend;
mod registry;
mod session;

pub use backend::{
    EventMask, EventSinks, EventStreams, FsEvent, FsEventKind, WatchBackend, event_channel,
};
pub use error::WatchError;
pub use notify_backend::NotifyBackend;
pub use registry::WatchRegistry;
pub use session::{DEFAULT_CLOSE_TIMEOUT, INTERIOR_MASK, USAGE_MASK, WatchSession, watch};
