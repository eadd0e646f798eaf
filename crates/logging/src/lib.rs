#![warn(missing_docs)]

//! Logging setup shared by attrsync binaries.
//!
//! Level flags only touch attrsync targets (see [`our_crates`]); everything
//! else stays at its default unless an explicit filter or `RUST_LOG` says
//! otherwise. The engine logs at three levels worth knowing:
//!
//! - `warn`: failed disconnects and driver commands that errored
//! - `debug`: activation, watcher rebuilds, refreshes, overlay detection
//! - `trace`: per-frame work (coalesced rescans, drain chunks, ignored events)
//!
//! The simulator adds one `info` summary per run.
//!
//! `trace` is loud under bursty workloads; `--log-filter attrsync=debug` is
//! usually the right starting point when watching a simulation.

use std::env;

use clap::Args;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, registry};

/// Logging flags flattened into every attrsync CLI.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Log attrsync targets at trace level
    #[arg(long, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Log attrsync targets at debug level
    #[arg(long, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// Level for attrsync targets (error|warn|info|debug|trace)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<Level>,

    /// Raw tracing filter directive, e.g. "attrsync=trace,attrsync_sim=info".
    /// Overrides every other flag.
    #[arg(long, value_name = "DIRECTIVES")]
    pub log_filter: Option<String>,
}

impl LogArgs {
    /// Level requested by the flags, if any.
    pub fn level(&self) -> Option<Level> {
        if self.trace {
            Some(Level::TRACE)
        } else if self.debug {
            Some(Level::DEBUG)
        } else {
            self.log_level
        }
    }

    /// Filter spec for these flags, falling back to `RUST_LOG`.
    pub fn spec(&self) -> String {
        spec_for(self, env::var("RUST_LOG").ok().as_deref())
    }
}

/// Tracing targets emitted by this workspace.
pub fn our_crates() -> &'static [&'static str] {
    &["attrsync", "attrsync_sim", "logging"]
}

/// Directive string setting `level` on every target in [`our_crates`].
pub fn level_spec_for(level: Level) -> String {
    let lvl = level.to_string().to_ascii_lowercase();
    our_crates()
        .iter()
        .map(|t| format!("{t}={lvl}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Resolve the filter spec. Precedence: `log_filter`, then a level flag,
/// then `rust_log`, then `info` on our crates. An empty `rust_log` counts as
/// unset.
pub fn spec_for(args: &LogArgs, rust_log: Option<&str>) -> String {
    if let Some(spec) = &args.log_filter {
        return spec.clone();
    }
    if let Some(level) = args.level() {
        return level_spec_for(level);
    }
    match rust_log.map(str::trim) {
        Some(spec) if !spec.is_empty() => spec.to_string(),
        _ => level_spec_for(Level::INFO),
    }
}

/// Install a compact stderr subscriber for `args` and return the filter
/// directives in use. An already installed global subscriber is kept.
pub fn init(args: &LogArgs) -> String {
    let spec = args.spec();
    registry()
        .with(EnvFilter::new(&spec))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .compact(),
        )
        .try_init()
        .ok();
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        let args = LogArgs {
            log_level: Some(Level::WARN),
            log_filter: Some("attrsync=trace".into()),
            ..LogArgs::default()
        };
        assert_eq!(spec_for(&args, Some("debug")), "attrsync=trace");
    }

    #[test]
    fn level_flags_scope_to_our_crates() {
        let debug = LogArgs {
            debug: true,
            ..LogArgs::default()
        };
        assert_eq!(
            spec_for(&debug, None),
            "attrsync=debug,attrsync_sim=debug,logging=debug"
        );
        let warn = LogArgs {
            log_level: Some(Level::WARN),
            ..LogArgs::default()
        };
        assert_eq!(
            spec_for(&warn, Some("trace")),
            "attrsync=warn,attrsync_sim=warn,logging=warn"
        );
    }

    #[test]
    fn rust_log_is_the_fallback_and_blank_means_unset() {
        let args = LogArgs::default();
        assert_eq!(spec_for(&args, Some("attrsync::watcher=trace")), "attrsync::watcher=trace");
        assert_eq!(spec_for(&args, Some("  ")), level_spec_for(Level::INFO));
        assert_eq!(spec_for(&args, None), level_spec_for(Level::INFO));
    }

    #[test]
    fn trace_flag_beats_log_level() {
        let args = LogArgs {
            trace: true,
            log_level: Some(Level::ERROR),
            ..LogArgs::default()
        };
        assert_eq!(args.level(), Some(Level::TRACE));
    }
}
