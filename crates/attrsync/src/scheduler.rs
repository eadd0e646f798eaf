//! Frame-aligned chunked draining of pending work.
//!
//! A [`ChunkedScheduler`] owns one logical stream of work items. Pushing into
//! an idle stream requests one frame; that frame snapshots the queue and
//! processes it `chunk_size` items per frame until the snapshot is exhausted.
//! Only one drain loop exists per stream at a time.
//!
//! Items pushed while a drain is in flight are not folded into the running
//! snapshot. When the snapshot runs out the drain re-reads the queue and, if
//! anything arrived, starts a fresh cycle on the next frame.

use std::{
    collections::VecDeque,
    mem,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::trace;

use crate::frame::FrameScheduler;

/// Per-item work function.
pub type Worker<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Mutable half of a stream.
struct DrainState<T> {
    /// Items waiting for the next snapshot.
    pending: Vec<T>,
    /// A drain is requested or running.
    scheduled: bool,
    /// Cleared on cancel; frame callbacks check it before doing anything.
    alive: bool,
    /// Items handed to the worker.
    processed: u64,
    /// Chunks run.
    chunks: u64,
}

/// State shared between the handle and in-flight frame callbacks.
struct Shared<T> {
    /// Stream name for logs.
    label: &'static str,
    /// Items per frame, at least one.
    chunk_size: usize,
    /// Frame source for drain steps.
    frames: FrameScheduler,
    /// Per-item work.
    worker: Worker<T>,
    /// Queue and counters.
    state: Mutex<DrainState<T>>,
}

/// Chunked, frame-aligned work queue for one logical stream.
pub struct ChunkedScheduler<T> {
    /// Stream state; frame callbacks hold it weakly.
    shared: Arc<Shared<T>>,
}

impl<T> std::fmt::Debug for ChunkedScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.shared.state.lock();
        f.debug_struct("ChunkedScheduler")
            .field("label", &self.shared.label)
            .field("chunk_size", &self.shared.chunk_size)
            .field("pending", &st.pending.len())
            .field("scheduled", &st.scheduled)
            .field("alive", &st.alive)
            .finish()
    }
}

impl<T: Send + 'static> ChunkedScheduler<T> {
    /// Create a stream that runs `worker` on each item, `chunk_size` items per
    /// frame. A chunk size of zero is treated as one.
    pub fn new(
        label: &'static str,
        frames: FrameScheduler,
        chunk_size: usize,
        worker: Worker<T>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                label,
                chunk_size: chunk_size.max(1),
                frames,
                worker,
                state: Mutex::new(DrainState {
                    pending: Vec::new(),
                    scheduled: false,
                    alive: true,
                    processed: 0,
                    chunks: 0,
                }),
            }),
        }
    }

    /// Queue items and make sure a drain is scheduled. Returns true when this
    /// call requested a new drain.
    pub fn schedule<I>(&self, items: I) -> bool
    where
        I: IntoIterator<Item = T>,
    {
        let start = {
            let mut st = self.shared.state.lock();
            if !st.alive {
                return false;
            }
            st.pending.extend(items);
            if st.scheduled || st.pending.is_empty() {
                false
            } else {
                st.scheduled = true;
                true
            }
        };
        if start {
            request_drain(Arc::downgrade(&self.shared));
        }
        start
    }

    /// Abandon the stream: drop queued items and turn any frame callback
    /// still in flight into a no-op.
    pub fn cancel(&self) {
        let mut st = self.shared.state.lock();
        st.alive = false;
        st.scheduled = false;
        st.pending.clear();
    }

    /// Items queued but not yet snapshotted by a drain.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Whether a drain is requested or running.
    pub fn is_scheduled(&self) -> bool {
        self.shared.state.lock().scheduled
    }

    /// No drain in flight and nothing queued.
    pub fn is_idle(&self) -> bool {
        let st = self.shared.state.lock();
        !st.scheduled && st.pending.is_empty()
    }

    /// Items handed to the worker so far.
    pub fn processed(&self) -> u64 {
        self.shared.state.lock().processed
    }

    /// Chunks run so far.
    pub fn chunks(&self) -> u64 {
        self.shared.state.lock().chunks
    }

    /// Items processed per frame.
    pub fn chunk_size(&self) -> usize {
        self.shared.chunk_size
    }
}

/// Request a frame that snapshots the queue and starts a drain.
fn request_drain<T: Send + 'static>(weak: Weak<Shared<T>>) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    shared.frames.request(Box::new(move || {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let batch: VecDeque<T> = {
            let mut st = shared.state.lock();
            if !st.alive {
                return;
            }
            mem::take(&mut st.pending).into()
        };
        trace!(stream = shared.label, items = batch.len(), "drain_start");
        run_chunk(Arc::downgrade(&shared), batch);
    }));
}

/// Process one chunk of `batch`, then request the next step.
fn run_chunk<T: Send + 'static>(weak: Weak<Shared<T>>, mut batch: VecDeque<T>) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    if !shared.state.lock().alive {
        return;
    }

    let n = shared.chunk_size.min(batch.len());
    for item in batch.drain(..n) {
        (shared.worker)(item);
    }

    let mut st = shared.state.lock();
    if !st.alive {
        return;
    }
    st.processed += n as u64;
    st.chunks += 1;

    if !batch.is_empty() {
        drop(st);
        let next = Arc::downgrade(&shared);
        shared
            .frames
            .request(Box::new(move || run_chunk(next, batch)));
    } else if st.pending.is_empty() {
        st.scheduled = false;
        trace!(stream = shared.label, processed = st.processed, "drain_idle");
    } else {
        drop(st);
        trace!(stream = shared.label, "drain_rearm");
        request_drain(Arc::downgrade(&shared));
    }
}
