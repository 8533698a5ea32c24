//! Session orchestration: watch every cache, then prune every cache.
//!
//! One watch session runs per cache root, concurrently. When the
//! begin-pruning token fires every session closes its backend and hands
//! back its usage set; only after all of them have returned does pruning
//! start, one blocking task per root. A cancelled shutdown token at that
//! point means the run was aborted and nothing is pruned.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cache::{self, CacheKind, CacheRoot, PruneTally, UsageSet};
use crate::config::Settings;
use crate::error::{ExitCode, RunError, RunResult};
use crate::toolchain;
use crate::watcher::{NotifyBackend, WatchBackend, WatchError, WatchSession};

/// Everything a run needs, built once at startup.
#[derive(Debug, Clone)]
pub struct RunContext {
    roots: Vec<CacheRoot>,
    /// Cancelled to abort the whole run.
    shutdown: CancellationToken,
    /// Child of `shutdown`; cancelled to end the watch phase.
    begin_pruning: CancellationToken,
    close_timeout: Duration,
}

impl RunContext {
    pub fn new(roots: Vec<CacheRoot>, close_timeout: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let begin_pruning = shutdown.child_token();
        Self {
            roots,
            shutdown,
            begin_pruning,
            close_timeout,
        }
    }

    /// Resolve every enabled cache root, asking the toolchain for any
    /// location the settings leave unset.
    pub async fn from_settings(settings: &Settings) -> RunResult<Self> {
        let roots = resolve_roots(settings).await?;
        Ok(Self::new(roots, settings.watch.close_timeout()))
    }

    pub fn roots(&self) -> &[CacheRoot] {
        &self.roots
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn begin_pruning_token(&self) -> CancellationToken {
        self.begin_pruning.clone()
    }

    /// End the watch phase and move on to pruning.
    pub fn begin_pruning(&self) {
        self.begin_pruning.cancel();
    }

    /// Abort the run. Nothing is pruned.
    pub fn abort(&self) {
        self.shutdown.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Pruning ran; one tally per root, in root order.
    Pruned(Vec<PruneTally>),
    /// No session observed any usage.
    NothingToPrune,
    /// Aborted before the prune phase.
    Aborted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Pruned(_) => ExitCode::Success,
            Self::NothingToPrune | Self::Aborted => ExitCode::NothingToPrune,
        }
    }
}

/// Configured roots for the enabled caches, made absolute.
pub async fn resolve_roots(settings: &Settings) -> RunResult<Vec<CacheRoot>> {
    let mut roots = Vec::new();
    for kind in settings.enabled_caches() {
        let path = match settings.cache_path(kind)? {
            Some(path) => path,
            None => {
                let path = toolchain::default_cache_path(&settings.toolchain.go, kind).await?;
                crate::debug_event!(
                    "run",
                    "default location",
                    "{kind} at {} ({})",
                    path.display(),
                    toolchain::env_var(kind)
                );
                std::path::absolute(&path)?
            }
        };
        roots.push(CacheRoot::new(kind, path));
    }
    Ok(roots)
}

/// Watch then prune with the platform backend.
pub async fn run(ctx: &RunContext) -> RunResult<RunOutcome> {
    run_with(ctx, |_| NotifyBackend::new()).await
}

/// Watch then prune, building one backend per root with `make_backend`.
pub async fn run_with<B, F>(ctx: &RunContext, make_backend: F) -> RunResult<RunOutcome>
where
    B: WatchBackend + 'static,
    F: Fn(&CacheRoot) -> Result<B, WatchError>,
{
    let usage = match watch_all(ctx, make_backend).await? {
        Some(usage) => usage,
        None => {
            crate::log_event!("run", "aborted", "skipping prune");
            return Ok(RunOutcome::Aborted);
        }
    };

    if usage.iter().all(UsageSet::is_empty) {
        crate::log_event!("run", "nothing to prune", "no cache usage was observed");
        return Ok(RunOutcome::NothingToPrune);
    }

    let tallies = prune_all(ctx, usage).await?;
    Ok(RunOutcome::Pruned(tallies))
}

/// Run every watch session to completion. Returns `None` if the run was
/// aborted while watching.
async fn watch_all<B, F>(ctx: &RunContext, make_backend: F) -> RunResult<Option<Vec<UsageSet>>>
where
    B: WatchBackend + 'static,
    F: Fn(&CacheRoot) -> Result<B, WatchError>,
{
    let mut sessions = JoinSet::new();
    for (index, root) in ctx.roots.iter().enumerate() {
        let backend = match make_backend(root) {
            Ok(backend) => backend,
            Err(source) => {
                ctx.abort();
                drain(&mut sessions).await;
                return Err(watch_failed(root, source));
            }
        };
        let session = WatchSession::new(root.clone(), backend).close_timeout(ctx.close_timeout);
        let cancel = ctx.begin_pruning.clone();
        sessions.spawn(async move { (index, session.run(cancel).await) });
    }

    let mut usage = vec![UsageSet::new(); ctx.roots.len()];
    let mut failure = None;
    while let Some(joined) = sessions.join_next().await {
        match joined {
            Ok((index, Ok(set))) => usage[index] = set,
            Ok((index, Err(source))) => {
                if failure.is_none() {
                    // Stop the other sessions; their results are discarded.
                    ctx.abort();
                    failure = Some(watch_failed(&ctx.roots[index], source));
                }
            }
            Err(e) => {
                if failure.is_none() {
                    ctx.abort();
                    failure = Some(RunError::Task {
                        stage: "watch",
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    if ctx.is_aborted() {
        return Ok(None);
    }
    Ok(Some(usage))
}

async fn prune_all(ctx: &RunContext, usage: Vec<UsageSet>) -> RunResult<Vec<PruneTally>> {
    let mut tasks = JoinSet::new();
    for (index, (root, set)) in ctx.roots.iter().cloned().zip(usage).enumerate() {
        crate::log_event!(
            "prune",
            "starting",
            "{} with {} used {}",
            root.kind(),
            set.len(),
            used_noun(root.kind())
        );
        tasks.spawn_blocking(move || (index, cache::prune(&root, &set)));
    }

    let mut tallies: Vec<Option<PruneTally>> = vec![None; ctx.roots.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, tally) = joined.map_err(|e| RunError::Task {
            stage: "prune",
            reason: e.to_string(),
        })?;
        crate::log_event!("prune", "finished", "{tally}");
        tallies[index] = Some(tally);
    }

    Ok(tallies.into_iter().flatten().collect())
}

async fn drain<T: 'static>(set: &mut JoinSet<T>) {
    while set.join_next().await.is_some() {}
}

fn watch_failed(root: &CacheRoot, source: WatchError) -> RunError {
    RunError::Watch {
        cache: format!("{} {}", root.kind(), root.path().display()),
        source,
    }
}

fn used_noun(kind: CacheKind) -> &'static str {
    match kind {
        CacheKind::Module => "units",
        CacheKind::Build => "entries",
    }
}
