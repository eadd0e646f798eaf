//! Error handling for the attrsync-sim crate.

use std::result;

use thiserror::Error;

/// Convenient result type for simulator operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur while running a simulation.
#[derive(Debug, Error)]
pub enum Error {
    /// Engine construction or settings failures.
    #[error("Engine error: {0}")]
    Engine(#[from] attrsync::Error),
    /// The driver task panicked or was aborted.
    #[error("Driver task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// The driver stopped before the workload finished sending commands.
    #[error("Driver stopped early")]
    DriverGone,
    /// Runtime construction failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
