//! Crate error type.

use std::{io, result::Result as StdResult};

use thiserror::Error;

/// Convenient result type for the attrsync crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the annotation sync engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A selector string could not be parsed.
    #[error("invalid selector {selector:?}: {message}")]
    Selector {
        /// The offending selector text.
        selector: String,
        /// What went wrong.
        message: String,
    },

    /// Settings failed validation.
    #[error("config error: {0}")]
    Config(String),

    /// Settings text is not valid RON.
    #[error("config parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// I/O failure while reading settings.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The host refused to disconnect a structural-change subscription.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// The orchestrator was torn down; build a fresh one instead.
    #[error("orchestrator has been torn down")]
    TornDown,
}
