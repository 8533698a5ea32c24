//! Configuration for a pruning run.
//!
//! Settings are layered, later sources winning:
//! - Default values
//! - TOML configuration file (`--config`, or `.cache-prune.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CACHE_PRUNE_` and use
//! double underscores to separate nested levels:
//! - `CACHE_PRUNE_CACHES__MODULE=/go/pkg/mod` sets `caches.module`
//! - `CACHE_PRUNE_CACHES__ONLY_BUILD=true` sets `caches.only_build`
//! - `CACHE_PRUNE_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheKind;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = ".cache-prune.toml";

/// Name of the PID file placed in the system temp directory.
pub const PID_FILENAME: &str = "cache-prune.pid";

const ENV_PREFIX: &str = "CACHE_PRUNE_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("cannot resolve cache path {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Settings {
    /// Which caches to prune and where they live
    #[serde(default)]
    pub caches: CachesConfig,

    /// Single-instance guard
    #[serde(default)]
    pub pid_file: PidFileConfig,

    /// Log levels and destination
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Toolchain used to discover default cache locations
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Watch session tuning
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CachesConfig {
    /// Module cache root; queried from the toolchain when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<PathBuf>,

    /// Build cache root; queried from the toolchain when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<PathBuf>,

    /// Only prune the module cache
    #[serde(default)]
    pub only_module: bool,

    /// Only prune the build cache
    #[serde(default)]
    pub only_build: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PidFileConfig {
    /// Write a PID file while running
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Location of the PID file
    #[serde(default = "default_pid_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// `stdout`, `stderr`, or a file path to append to
    #[serde(default = "default_log_output")]
    pub output: String,

    /// Per-target level overrides, e.g. `cache_prune::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ToolchainConfig {
    /// Go binary queried with `go env`
    #[serde(default = "default_go_binary")]
    pub go: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// How long to wait for the watcher to release its resources
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_pid_path() -> PathBuf {
    std::env::temp_dir().join(PID_FILENAME)
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_output() -> String {
    "stdout".to_string()
}
fn default_go_binary() -> String {
    "go".to_string()
}
fn default_close_timeout_ms() -> u64 {
    5_000
}

impl Default for PidFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_pid_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            output: default_log_output(),
            modules: HashMap::new(),
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            go: default_go_binary(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl WatchConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match config_file {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Double underscore separates nested levels
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(|e| ConfigError::Invalid(Box::new(e)))
    }

    /// Reject contradictory cache selections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let caches = &self.caches;
        if caches.only_module && caches.only_build {
            return Err(ConfigError::Conflict(
                "--only-mod-cache and --only-build-cache are mutually exclusive",
            ));
        }
        if caches.only_build && caches.module.is_some() {
            return Err(ConfigError::Conflict(
                "--mod-cache must be unset when --only-build-cache is set",
            ));
        }
        if caches.only_module && caches.build.is_some() {
            return Err(ConfigError::Conflict(
                "--build-cache must be unset when --only-mod-cache is set",
            ));
        }
        Ok(())
    }

    /// Caches selected for this run, in pruning-report order.
    pub fn enabled_caches(&self) -> Vec<CacheKind> {
        let mut kinds = Vec::with_capacity(2);
        if !self.caches.only_build {
            kinds.push(CacheKind::Module);
        }
        if !self.caches.only_module {
            kinds.push(CacheKind::Build);
        }
        kinds
    }

    /// Explicitly configured root for `kind`, made absolute.
    pub fn cache_path(&self, kind: CacheKind) -> Result<Option<PathBuf>, ConfigError> {
        let configured = match kind {
            CacheKind::Module => self.caches.module.as_ref(),
            CacheKind::Build => self.caches.build.as_ref(),
        };
        configured
            .map(|path| {
                std::path::absolute(path).map_err(|source| ConfigError::Path {
                    path: path.clone(),
                    source,
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.caches.module, None);
        assert!(settings.pid_file.enabled);
        assert!(settings.pid_file.path.ends_with(PID_FILENAME));
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.toolchain.go, "go");
        assert_eq!(settings.watch.close_timeout(), Duration::from_secs(5));
        assert_eq!(
            settings.enabled_caches(),
            vec![CacheKind::Module, CacheKind::Build]
        );
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[caches]
build = "/ci/go-build"
only_build = true

[pid_file]
enabled = false

[logging]
default = "debug"
output = "/var/log/prune.log"

[logging.modules]
"cache_prune::watcher" = "trace"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load(Some(&config_path)).unwrap();
        assert_eq!(settings.caches.build, Some(PathBuf::from("/ci/go-build")));
        assert!(settings.caches.only_build);
        assert!(!settings.pid_file.enabled);
        assert_eq!(settings.logging.default, "debug");
        assert_eq!(settings.logging.modules["cache_prune::watcher"], "trace");
        assert_eq!(settings.enabled_caches(), vec![CacheKind::Build]);
        // Untouched sections keep their defaults
        assert_eq!(settings.toolchain.go, "go");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.toml");

        let err = Settings::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(err.to_string().starts_with("configuration file not found: "));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[toolchain]\ngo = \"/usr/local/go/bin/go\"\n").unwrap();

        unsafe {
            std::env::set_var("CACHE_PRUNE_WATCH__CLOSE_TIMEOUT_MS", "250");
        }

        let settings = Settings::load(Some(&config_path)).unwrap();

        unsafe {
            std::env::remove_var("CACHE_PRUNE_WATCH__CLOSE_TIMEOUT_MS");
        }

        assert_eq!(settings.watch.close_timeout_ms, 250);
        assert_eq!(settings.toolchain.go, "/usr/local/go/bin/go");
    }

    #[test]
    fn test_validate_conflicts() {
        let mut settings = Settings::default();
        settings.caches.only_module = true;
        settings.caches.only_build = true;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.caches.only_build = true;
        settings.caches.module = Some(PathBuf::from("/mod"));
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.caches.only_module = true;
        settings.caches.build = Some(PathBuf::from("/build"));
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.caches.only_module = true;
        settings.caches.module = Some(PathBuf::from("/mod"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_cache_path_is_absolute() {
        let mut settings = Settings::default();
        settings.caches.build = Some(PathBuf::from("relative/build"));

        let path = settings.cache_path(CacheKind::Build).unwrap().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("relative/build"));
        assert_eq!(settings.cache_path(CacheKind::Module).unwrap(), None);
    }
}
