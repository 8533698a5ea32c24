//! OS signal wiring.
//!
//! SIGHUP begins pruning by cancelling the watch-phase token. SIGINT and
//! SIGTERM abort the run by cancelling the shutdown token, which also
//! cancels the watch phase.

use std::io;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Start listening for lifecycle signals.
///
/// Handlers are installed before this returns, so a SIGHUP sent right
/// after it can no longer terminate the process. The listener task exits
/// once `shutdown` is cancelled.
#[cfg(unix)]
pub fn spawn_listener(
    shutdown: CancellationToken,
    begin_pruning: CancellationToken,
) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = hangup.recv() => {
                    if !begin_pruning.is_cancelled() {
                        crate::log_event!("run", "received SIGHUP", "stopping watchers");
                        begin_pruning.cancel();
                    }
                }
                Some(()) = interrupt.recv() => {
                    crate::log_event!("run", "received SIGINT", "aborting");
                    shutdown.cancel();
                }
                Some(()) = terminate.recv() => {
                    crate::log_event!("run", "received SIGTERM", "aborting");
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => break,
                else => break,
            }
        }
    }))
}

/// Start listening for lifecycle signals.
///
/// Only Ctrl-C is available here; it aborts the run.
#[cfg(not(unix))]
pub fn spawn_listener(
    shutdown: CancellationToken,
    _begin_pruning: CancellationToken,
) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::error!("[run] failed to listen for Ctrl-C: {e}");
                    return;
                }
                crate::log_event!("run", "received Ctrl-C", "aborting");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    }))
}
