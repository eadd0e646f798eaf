//! Command-line interface definitions for attrsync-sim.

use std::path::PathBuf;

use clap::Parser;
use logging::LogArgs;

/// Command-line interface for the `attrsync-sim` binary.
#[derive(Parser, Debug)]
#[command(
    name = "attrsync-sim",
    about = "Run the annotation engine against a scripted in-memory workload",
    version
)]
pub struct Cli {
    /// Logging controls shared across attrsync binaries.
    #[command(flatten)]
    pub log: LogArgs,

    /// Optional engine settings file (RON).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the effective settings as RON and exit.
    #[arg(long)]
    pub dump_config: bool,

    /// Panes opened per simulated view type.
    #[arg(long, default_value_t = 2)]
    pub panes: usize,

    /// Insertion rounds per pane.
    #[arg(long, default_value_t = 5)]
    pub rounds: usize,

    /// Items inserted per pane per round.
    #[arg(long, default_value_t = 25)]
    pub batch: usize,

    /// Entries in the simulated suggestion popup.
    #[arg(long, default_value_t = 30)]
    pub suggestions: usize,

    /// Frame period in milliseconds.
    #[arg(long, default_value_t = 16)]
    pub frame_ms: u64,
}
