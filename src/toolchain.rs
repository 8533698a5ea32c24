//! Queries the Go toolchain for its default cache locations.

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

use crate::cache::CacheKind;

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("running `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("`{command}` printed nothing")]
    EmptyOutput { command: String },
}

/// Environment variable naming the toolchain's location for `kind`.
pub fn env_var(kind: CacheKind) -> &'static str {
    match kind {
        CacheKind::Module => "GOMODCACHE",
        CacheKind::Build => "GOCACHE",
    }
}

/// Run `<go> env <name>` and return its single line of output.
pub async fn go_env(go: &str, name: &str) -> Result<String, ToolchainError> {
    let command = format!("{go} env {name}");

    let output = Command::new(go)
        .args(["env", name])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ToolchainError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ToolchainError::Failed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let value = String::from_utf8_lossy(&output.stdout);
    let value = value.trim_end_matches(['\n', '\r']);
    if value.is_empty() {
        return Err(ToolchainError::EmptyOutput { command });
    }

    Ok(value.to_string())
}

/// Default root of the cache of the given kind.
pub async fn default_cache_path(go: &str, kind: CacheKind) -> Result<PathBuf, ToolchainError> {
    go_env(go, env_var(kind)).await.map(PathBuf::from)
}
