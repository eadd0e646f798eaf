//! Async driver that runs an [`Orchestrator`] on a tokio task.
//!
//! The driver owns the orchestrator and multiplexes three inputs: host
//! commands from a channel, a frame interval that ticks the shared
//! [`FrameScheduler`](crate::frame::FrameScheduler), and a cancellation
//! token. Cancellation or a closed channel ends the loop with a teardown.

use std::time::Duration;

use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    host::HostEvent,
    orchestrator::{Orchestrator, TeardownReport},
};

/// Default frame period, roughly 60 frames per second.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Inputs accepted by a running [`Driver`].
#[derive(Debug, Clone)]
pub enum Command {
    /// Forward a host notification.
    Host(HostEvent),
    /// Force a global refresh (settings changed).
    RefreshAll,
    /// Tear down and re-activate (settings changed).
    Reload,
}

/// Hook run at the start of every frame, before frame callbacks.
pub type FrameHook = Box<dyn FnMut() + Send>;

/// Runs an orchestrator until cancelled.
pub struct Driver {
    /// The engine being driven.
    orchestrator: Orchestrator,
    /// Period of the frame ticker.
    frame_interval: Duration,
    /// Runs before each frame's callbacks.
    frame_hook: Option<FrameHook>,
}

impl Driver {
    /// Drive `orchestrator` at the default frame rate.
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            frame_hook: None,
        }
    }

    /// Override the frame period.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Run `hook` at the start of every frame. Hosts whose structural-change
    /// records are delivered by polling hook that delivery in here.
    pub fn with_frame_hook(mut self, hook: FrameHook) -> Self {
        self.frame_hook = Some(hook);
        self
    }

    /// The driven orchestrator.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Activate, then process commands and frames until `cancel` fires or
    /// the command channel closes. Returns the torn-down orchestrator.
    pub async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) -> (Orchestrator, TeardownReport) {
        if let Err(e) = self.orchestrator.activate() {
            warn!(error = %e, "driver_activate_failed");
        }
        let frames = self.orchestrator.frames().clone();
        let mut ticker = time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(
            frame_ms = self.frame_interval.as_millis() as u64,
            "driver_start"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    trace!("driver_cancelled");
                    break;
                }
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => {
                        trace!("driver_channel_closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if let Some(hook) = self.frame_hook.as_mut() {
                        hook();
                    }
                    frames.tick();
                }
            }
        }

        let report = self.orchestrator.teardown();
        debug!(
            cleared = report.cleared,
            errors = report.errors.len(),
            "driver_stop"
        );
        (self.orchestrator, report)
    }

    /// Execute one command, logging failures.
    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Host(event) => self.orchestrator.handle_event(event),
            Command::RefreshAll => {
                if let Err(e) = self.orchestrator.refresh_all() {
                    warn!(error = %e, "refresh_all_failed");
                }
            }
            Command::Reload => {
                if let Err(e) = self.orchestrator.reload() {
                    warn!(error = %e, "reload_failed");
                }
            }
        }
    }
}
