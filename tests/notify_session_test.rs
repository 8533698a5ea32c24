//! Watch-then-prune cycles over the real notify backend.
#![cfg(target_os = "linux")]

use std::fs;
use std::time::Duration;

use cache_prune::CacheRoot;
use cache_prune::orchestrator::{self, RunContext, RunOutcome};
use cache_prune::watcher;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_empty_caches_prune_nothing() {
    let temp = TempDir::new().unwrap();
    let mod_root = temp.path().join("mod");
    let build_root = temp.path().join("build");
    fs::create_dir_all(&mod_root).unwrap();
    fs::create_dir_all(&build_root).unwrap();

    let ctx = RunContext::new(
        vec![CacheRoot::module(&mod_root), CacheRoot::build(&build_root)],
        CLOSE_TIMEOUT,
    );
    let trigger = ctx.begin_pruning_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let outcome = orchestrator::run(&ctx).await.unwrap();

    assert!(matches!(outcome, RunOutcome::NothingToPrune));
    assert!(mod_root.is_dir());
    assert!(build_root.is_dir());
}

#[tokio::test]
async fn test_build_cache_entries_written_during_watch_survive() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    fs::create_dir_all(root.join("0a")).unwrap();
    fs::write(root.join("0a/0a11-d"), "stale").unwrap();

    let ctx = RunContext::new(vec![CacheRoot::build(&root)], CLOSE_TIMEOUT);
    let trigger = ctx.begin_pruning_token();
    let fresh = root.join("0a/0a22-d");
    let writer = tokio::spawn({
        let fresh = fresh.clone();
        async move {
            // Keep writing until the watch is certainly in place.
            for round in 0..20 {
                fs::write(&fresh, format!("round {round}")).unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        }
    });

    let outcome = orchestrator::run(&ctx).await.unwrap();
    writer.await.unwrap();

    let RunOutcome::Pruned(tallies) = outcome else {
        panic!("expected a prune, got {outcome:?}");
    };
    assert_eq!(tallies[0].deleted, 1);
    assert!(fresh.exists());
    assert!(!root.join("0a/0a11-d").exists());
}

#[tokio::test]
async fn test_module_unit_extracted_during_watch_is_kept() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    let stale = root.join("example.com/stale@v1.0.0");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join("go.mod"), "module example.com/stale\n").unwrap();

    let cancel = CancellationToken::new();
    let session = tokio::spawn(watcher::watch(
        CacheRoot::module(&root),
        cancel.clone(),
        CLOSE_TIMEOUT,
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let fresh = root.join("example.com/fresh@v0.2.0");
    fs::create_dir_all(&fresh).unwrap();
    fs::write(fresh.join("go.mod"), "module example.com/fresh\n").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    cancel.cancel();
    let usage = session.await.unwrap().unwrap();

    assert!(usage.contains(&fresh));
    assert!(!usage.contains(&stale));
}
