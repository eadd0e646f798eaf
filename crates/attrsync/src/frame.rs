//! Cooperative yield primitive standing in for an animation-frame clock.
//!
//! Work requested through [`FrameScheduler::request`] runs on the next
//! [`FrameScheduler::tick`]. A tick only runs the callbacks that were queued
//! when it started; anything requested from inside a callback waits for the
//! following tick, so a long job that re-requests itself yields between steps.

use std::{collections::VecDeque, mem, sync::Arc};

use parking_lot::Mutex;
use tracing::trace;

/// Deferred unit of work.
pub type FrameCallback = Box<dyn FnOnce() + Send>;

/// State behind a [`FrameScheduler`].
#[derive(Default)]
struct FrameQueue {
    /// Callbacks waiting for the next tick, in request order.
    callbacks: VecDeque<FrameCallback>,
    /// Ticks so far.
    frames: u64,
    /// Callbacks run so far.
    callbacks_run: u64,
}

/// Shared queue of frame callbacks. Clones share the same queue.
#[derive(Clone, Default)]
pub struct FrameScheduler {
    /// Shared queue and counters.
    inner: Arc<Mutex<FrameQueue>>,
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = self.inner.lock();
        f.debug_struct("FrameScheduler")
            .field("pending", &q.callbacks.len())
            .field("frames", &q.frames)
            .field("callbacks_run", &q.callbacks_run)
            .finish()
    }
}

impl FrameScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `cb` for the next frame.
    pub fn request(&self, cb: FrameCallback) {
        self.inner.lock().callbacks.push_back(cb);
    }

    /// Run one frame. Returns the number of callbacks run.
    pub fn tick(&self) -> usize {
        let batch = {
            let mut q = self.inner.lock();
            q.frames += 1;
            mem::take(&mut q.callbacks)
        };
        let ran = batch.len();
        for cb in batch {
            cb();
        }
        if ran > 0 {
            self.inner.lock().callbacks_run += ran as u64;
            trace!(ran, "frame_tick");
        }
        ran
    }

    /// Tick until nothing is pending or `max_frames` ticks ran. Returns the
    /// number of ticks that ran work.
    pub fn run_until_idle(&self, max_frames: usize) -> usize {
        let mut frames = 0;
        while frames < max_frames && !self.is_idle() {
            self.tick();
            frames += 1;
        }
        frames
    }

    /// Callbacks waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    /// Whether no callback is waiting.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Total ticks so far, including empty ones.
    pub fn frames(&self) -> u64 {
        self.inner.lock().frames
    }

    /// Total callbacks run so far.
    pub fn callbacks_run(&self) -> u64 {
        self.inner.lock().callbacks_run
    }
}
