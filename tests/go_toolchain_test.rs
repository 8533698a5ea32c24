//! Build-cache pruning against a real Go toolchain.
//!
//! Needs `go` on PATH; run with `cargo test -- --ignored`.
#![cfg(target_os = "linux")]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use cache_prune::cache::prune;
use cache_prune::{CacheRoot, watcher};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct GoEnv {
    _temp: TempDir,
    cache: PathBuf,
    out: PathBuf,
}

impl GoEnv {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("build");
        let out = temp.path().join("bin");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        Self {
            _temp: temp,
            cache,
            out,
        }
    }

    /// `go build -v` output; empty when everything came from the cache.
    fn build(&self, module: &str) -> String {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(module);
        let output = Command::new("go")
            .args(["build", "-v", "-o"])
            .arg(&self.out)
            .current_dir(dir)
            .env("GOCACHE", &self.cache)
            .env("GOFLAGS", "-mod=mod")
            .env("GOPROXY", "off")
            .output()
            .expect("go is installed");
        assert!(
            output.status.success(),
            "go build {module} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        combined
    }

    async fn start_watching(&self) -> (CancellationToken, JoinHandle<cache_prune::UsageSet>) {
        let cancel = CancellationToken::new();
        let root = CacheRoot::build(&self.cache);
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                watcher::watch(root, cancel, Duration::from_secs(5))
                    .await
                    .expect("watching build cache")
            }
        });
        // Let the initial walk finish and the watches go in.
        tokio::time::sleep(Duration::from_millis(500)).await;
        (cancel, handle)
    }

    async fn prune_after(
        &self,
        (cancel, handle): (CancellationToken, JoinHandle<cache_prune::UsageSet>),
    ) -> u64 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let usage = handle.await.unwrap();
        prune(&CacheRoot::build(&self.cache), &usage).deleted
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a Go toolchain"]
async fn test_build_cache_cycle() {
    let go = GoEnv::new();

    // Empty cache: nothing to delete.
    let watching = go.start_watching().await;
    assert_eq!(go.prune_after(watching).await, 0);

    // A watched build keeps everything it wrote.
    let watching = go.start_watching().await;
    assert!(!go.build("first").is_empty());
    assert_eq!(go.prune_after(watching).await, 0);

    // Build "first" unwatched, then watch a build of "second".
    assert!(go.build("first").is_empty());
    let watching = go.start_watching().await;
    assert!(!go.build("second").is_empty());
    assert!(go.prune_after(watching).await > 0);

    // "second" is still cached; "first" has to be rebuilt.
    assert!(go.build("second").is_empty());
    assert!(!go.build("first").is_empty());
}
