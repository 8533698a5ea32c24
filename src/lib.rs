//! Watch Go's module and build caches during a build, then delete the
//! entries the build never touched.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod pidfile;
pub mod signals;
pub mod toolchain;
pub mod watcher;

pub use cache::{CacheKind, CacheRoot, PruneTally, UsageSet};
pub use config::Settings;
pub use error::{ExitCode, RunError, RunResult};
pub use orchestrator::{RunContext, RunOutcome};
pub use watcher::{WatchBackend, WatchError, WatchSession};
