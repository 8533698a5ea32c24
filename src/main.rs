use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use cache_prune::cli::Cli;
use cache_prune::orchestrator::{self, RunContext, RunOutcome};
use cache_prune::pidfile::{self, PidFile};
use cache_prune::{ExitCode, Settings, log_event, logging, signals};

/// How often `--signal` checks whether the running instance has exited.
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code.into(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::Failure.into()
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply(&mut settings);
    settings.validate()?;

    logging::init_with_config(&settings.logging)
        .with_context(|| format!("opening log output {}", settings.logging.output))?;

    if cli.signal {
        let pid = pidfile::signal_running(&settings.pid_file.path, SIGNAL_POLL_INTERVAL).await?;
        log_event!("run", "instance exited", "PID {pid}");
        return Ok(ExitCode::Success);
    }

    // Checked before any toolchain query, and even with --no-pid-file.
    pidfile::ensure_not_running(&settings.pid_file.path)?;

    log_event!(
        "run",
        "starting",
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let ctx = RunContext::from_settings(&settings).await?;
    for root in ctx.roots() {
        log_event!("run", "cache", "{} {}", root.kind(), root.path().display());
    }

    // Handlers go in before the PID file is visible to `--signal`.
    let listener = signals::spawn_listener(ctx.shutdown_token(), ctx.begin_pruning_token())
        .context("installing signal handlers")?;

    let _pid_guard = if settings.pid_file.enabled {
        Some(PidFile::acquire(&settings.pid_file.path)?)
    } else {
        None
    };

    let outcome = orchestrator::run(&ctx).await;

    // Releases the signal listener.
    ctx.abort();
    let _ = listener.await;

    let outcome = outcome?;
    if let RunOutcome::Pruned(tallies) = &outcome {
        let deleted: u64 = tallies.iter().map(|t| t.deleted).sum();
        let failed: u64 = tallies.iter().map(|t| t.failed).sum();
        log_event!("run", "done", "{deleted} deleted, {failed} failed");
    }
    Ok(outcome.exit_code())
}
