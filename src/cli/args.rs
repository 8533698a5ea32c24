//! CLI argument parsing using clap.

use clap::{
    Parser,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::Settings;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Prune unused entries from the Go module and build caches
#[derive(Parser, Debug, Default)]
#[command(
    name = "cache-prune",
    version = env!("CARGO_PKG_VERSION"),
    about = "Prune unused entries from the Go module and build caches",
    long_about = "Watch the Go module and build caches while builds run, then delete \
                  every entry the builds did not touch.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Workflow:\n  $ cache-prune &                 # start watching\n  $ go build ./...                # run the builds to keep\n  $ cache-prune --signal          # prune, wait for it to finish\n\nExit status:\n  0  caches were pruned\n  1  fatal error\n  2  nothing to prune, or aborted"
)]
pub struct Cli {
    /// Path to a TOML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Log destination: stdout, stderr, or a file path
    #[arg(short, long, value_name = "PATH")]
    pub log: Option<String>,

    /// Module cache directory (default: `go env GOMODCACHE`)
    #[arg(long = "mod-cache", value_name = "DIR")]
    pub mod_cache: Option<PathBuf>,

    /// Build cache directory (default: `go env GOCACHE`)
    #[arg(long = "build-cache", value_name = "DIR")]
    pub build_cache: Option<PathBuf>,

    /// Only prune the module cache
    #[arg(long = "only-mod-cache")]
    pub only_mod_cache: bool,

    /// Only prune the build cache
    #[arg(long = "only-build-cache")]
    pub only_build_cache: bool,

    /// Do not write a PID file
    #[arg(long)]
    pub no_pid_file: bool,

    /// Signal the running instance to prune, and wait for it to exit
    #[arg(long)]
    pub signal: bool,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if self.debug {
            settings.logging.default = "debug".to_string();
        }
        if let Some(log) = &self.log {
            settings.logging.output = log.clone();
        }
        if let Some(dir) = &self.mod_cache {
            settings.caches.module = Some(dir.clone());
        }
        if let Some(dir) = &self.build_cache {
            settings.caches.build = Some(dir.clone());
        }
        settings.caches.only_module |= self.only_mod_cache;
        settings.caches.only_build |= self.only_build_cache;
        if self.no_pid_file {
            settings.pid_file.enabled = false;
        }
    }
}
