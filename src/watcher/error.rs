//! Error types for the watch session and its backends.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("failed to walk {path}: {reason}")]
    WalkFailed { path: PathBuf, reason: String },

    #[error("cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    /// The path already has a watch. Tolerated by the session.
    #[error("path {path} is already watched")]
    AlreadyWatched { path: PathBuf },

    #[error("file system event error: {details}")]
    EventError { details: String },

    /// The backend dropped events, so the usage set cannot be trusted.
    #[error("file system events were lost: {details}")]
    EventsLost { details: String },

    #[error("watcher {stream} channel closed unexpectedly")]
    ChannelClosed { stream: &'static str },
}

impl WatchError {
    /// Whether this error ends the session rather than being logged.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EventError { .. } | Self::AlreadyWatched { .. })
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

impl From<walkdir::Error> for WatchError {
    fn from(e: walkdir::Error) -> Self {
        WatchError::WalkFailed {
            path: e.path().map(PathBuf::from).unwrap_or_default(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_read_as_context() {
        let lost = WatchError::EventsLost {
            details: "queue overflow".into(),
        };
        assert_eq!(
            lost.to_string(),
            "file system events were lost: queue overflow"
        );
        assert!(lost.is_fatal());

        let event = WatchError::EventError {
            details: "bad event".into(),
        };
        assert!(event.to_string().starts_with("file system event error"));
        assert!(!event.is_fatal());

        let closed = WatchError::ChannelClosed { stream: "events" };
        assert_eq!(closed.to_string(), "watcher events channel closed unexpectedly");
    }
}
