use thiserror::Error;

use crate::config::ConfigError;
use crate::pidfile::PidFileError;
use crate::toolchain::ToolchainError;
use crate::watcher::WatchError;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("querying default cache location: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    PidFile(#[from] PidFileError),

    #[error("watching {cache}: {source}")]
    Watch {
        cache: String,
        #[source]
        source: WatchError,
    },

    #[error("{stage} task failed: {reason}")]
    Task { stage: &'static str, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RunResult<T> = Result<T, RunError>;

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Pruning ran.
    Success = 0,
    /// Startup, watching or signalling failed.
    Failure = 1,
    /// Nothing was observed, or the run was aborted before pruning.
    NothingToPrune = 2,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
