#![warn(missing_docs)]

//! Entry point for the `attrsync-sim` binary.

mod cli;
mod error;
mod workload;

use std::process;

use attrsync::Settings;
use clap::Parser;
use tracing::{debug, error};

use crate::{cli::Cli, error::Result, workload::Scenario};

/// Run and map failure to exit status 1.
fn main() {
    if let Err(err) = run() {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Parse CLI arguments, install logging, and run the scripted workload.
fn run() -> Result<()> {
    let cli = Cli::parse();
    let spec = logging::init(&cli.log);
    debug!(spec = %spec, "logging_ready");

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if cli.dump_config {
        println!("{}", settings.to_ron()?);
        return Ok(());
    }

    let scenario = Scenario::from(&cli);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(workload::run(settings, &scenario))?;
    println!("{summary}");
    Ok(())
}
