//! Single-instance guard and routing of the "begin pruning" signal.
//!
//! A running instance records its PID in a well-known file. A second
//! invocation with `--signal` reads that PID, sends SIGHUP, and waits for
//! the instance to finish pruning and exit.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PidFileError {
    #[error("another instance is already running (PID file {0} exists)")]
    AlreadyRunning(PathBuf),

    #[error("creating PID file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading PID file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing PID from PID file {path}: {contents:?}")]
    Parse { path: PathBuf, contents: String },

    #[error("signaling process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("signaling another process is not supported on this platform")]
    Unsupported,
}

/// PID file held for the lifetime of a run. Removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create the PID file exclusively and write the current PID to it.
    pub fn acquire(path: &Path) -> Result<Self, PidFileError> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o440);
        }

        let mut file = match options.open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PidFileError::AlreadyRunning(path.to_path_buf()));
            }
            Err(source) => {
                return Err(PidFileError::Create {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let guard = Self {
            path: path.to_path_buf(),
        };
        file.write_all(std::process::id().to_string().as_bytes())
            .map_err(|source| PidFileError::Create {
                path: path.to_path_buf(),
                source,
            })?;

        crate::debug_event!("run", "created PID file", "{}", path.display());
        Ok(guard)
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("[run] removing PID file {}: {e}", self.path.display());
            }
        }
    }
}

/// Refuse to start while another instance's PID file exists.
///
/// Applies whether or not this run writes a PID file of its own.
pub fn ensure_not_running(path: &Path) -> Result<(), PidFileError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Err(PidFileError::AlreadyRunning(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PidFileError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read the PID recorded in `path`.
pub fn read_pid(path: &Path) -> Result<u32, PidFileError> {
    let contents = fs::read_to_string(path).map_err(|source| PidFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    contents
        .trim()
        .parse()
        .map_err(|_| PidFileError::Parse {
            path: path.to_path_buf(),
            contents,
        })
}

/// Tell the instance recorded in `path` to start pruning, then wait for it
/// to finish. Returns the signalled PID.
///
/// The instance is done once it has released its PID file or exited.
pub async fn signal_running(path: &Path, poll: Duration) -> Result<u32, PidFileError> {
    let pid = read_pid(path)?;
    send_begin_pruning(pid)?;
    crate::log_event!("run", "signalled", "PID {pid}");

    while path.exists() && process_alive(pid) {
        tokio::time::sleep(poll).await;
    }
    Ok(pid)
}

#[cfg(unix)]
fn send_begin_pruning(pid: u32) -> Result<(), PidFileError> {
    let raw = libc::pid_t::try_from(pid).map_err(|_| PidFileError::Signal {
        pid,
        source: io::Error::from(io::ErrorKind::InvalidInput),
    })?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(raw, libc::SIGHUP) };
    if rc == 0 {
        Ok(())
    } else {
        Err(PidFileError::Signal {
            pid,
            source: io::Error::last_os_error(),
        })
    }
}

#[cfg(not(unix))]
fn send_begin_pruning(_pid: u32) -> Result<(), PidFileError> {
    Err(PidFileError::Unsupported)
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks for existence and permission.
    let rc = unsafe { libc::kill(raw, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}
