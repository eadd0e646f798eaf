//! attrsync
//!
//! Keeps computed annotations on link-like elements in sync with a host's
//! rendered views. The engine:
//! - maps view types to target selectors ([`SelectorRegistry`])
//! - watches view containers for structural changes ([`ContainerWatcher`],
//!   [`DynamicContainerWatcher`])
//! - detects transient overlays on each window's document ([`OverlayWatcher`])
//! - spreads rendering work over frames ([`ChunkedScheduler`])
//! - owns the lifecycle and debounces host notifications ([`Orchestrator`])
//!
//! The host supplies [`dom::Element`]/[`dom::Observer`] for its document,
//! [`Workspace`] for open views and [`Renderer`] for painting. [`memory`]
//! implements the document side in memory for tests and simulation.

mod annotate;
pub mod config;
mod debounce;
pub mod dom;
mod error;
mod frame;
mod host;
pub mod memory;
mod orchestrator;
mod overlay;
mod registry;
pub mod runtime;
mod scheduler;
mod selector;
pub mod test_support;
mod watcher;
mod watchlist;

pub use annotate::Annotator;
pub use config::Settings;
pub use debounce::Debouncer;
pub use error::{Error, Result};
pub use frame::{FrameCallback, FrameScheduler};
pub use host::{HostEvent, HostOptions, Renderer, Workspace};
pub use orchestrator::{HostBindings, Orchestrator, Phase, Stats, TeardownReport};
pub use overlay::{OverlayClassifier, OverlayKind, OverlayWatcher, PendingUpdate};
pub use registry::{RowCondition, RowKey, SelectorRegistry, ViewTypeDescriptor, ViewTypeRow};
pub use runtime::{Command, Driver};
pub use scheduler::{ChunkedScheduler, Worker};
pub use selector::Selector;
pub use watcher::{ContainerWatcher, DynamicContainerWatcher, WatchContext};
pub use watchlist::{WatchHandle, WatchId, WatchList, Watcher};
