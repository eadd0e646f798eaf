//! Per-container structural-change watchers.
//!
//! [`ContainerWatcher`] rescans its whole container once per frame in which
//! child insertions or removals were seen. [`DynamicContainerWatcher`] looks
//! only at inserted items and feeds their target elements to a
//! [`ChunkedScheduler`].

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use tracing::trace;

use crate::{
    annotate::Annotator,
    dom::{
        ElementRef, MutationCallback, MutationKind, MutationRecord, ObserveOptions, Observer,
        Subscription, elements_by_class,
    },
    error::Result,
    frame::FrameScheduler,
    registry::ViewTypeDescriptor,
    scheduler::ChunkedScheduler,
    selector::Selector,
};

/// Everything a watcher needs from its owner.
#[derive(Clone)]
pub struct WatchContext {
    /// Source of mutation subscriptions.
    pub observer: Arc<dyn Observer>,
    /// Frame clock for rescans and drains.
    pub frames: FrameScheduler,
    /// Applies annotations to matched elements.
    pub annotator: Annotator,
}

impl std::fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchContext")
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

/// Whether any record reports inserted or removed children.
fn has_child_list(records: &[MutationRecord]) -> bool {
    records.iter().any(|r| r.kind == MutationKind::ChildList)
}

/// State shared between a [`ContainerWatcher`] and its callbacks.
struct RescanShared {
    /// Watched subtree root.
    container: ElementRef,
    /// Matches the elements to annotate.
    selector: Selector,
    /// View type handed to the renderer.
    view_type: Option<String>,
    /// Applies annotations.
    annotator: Annotator,
    /// Frame clock for scheduled rescans.
    frames: FrameScheduler,
    /// A frame-aligned rescan is pending.
    scheduled: AtomicBool,
    /// Cleared on disconnect.
    alive: AtomicBool,
    /// Rescans run.
    rescans: AtomicU64,
}

impl RescanShared {
    /// Schedule one rescan for the next frame unless one is pending.
    fn on_records(self: &Arc<Self>, records: &[MutationRecord]) {
        if !self.alive.load(Ordering::SeqCst) || !has_child_list(records) {
            return;
        }
        if self.scheduled.swap(true, Ordering::SeqCst) {
            trace!(container = %self.container.id(), "rescan_coalesced");
            return;
        }
        let weak = Arc::downgrade(self);
        self.frames.request(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.run_scheduled();
            }
        }));
    }

    /// Frame callback. A container detached since the notification is skipped.
    fn run_scheduled(&self) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        if self.container.is_connected() {
            self.rescan();
        } else {
            trace!(container = %self.container.id(), "rescan_detached");
        }
        self.scheduled.store(false, Ordering::SeqCst);
    }

    /// Annotate every target in the container.
    fn rescan(&self) -> usize {
        self.rescans.fetch_add(1, Ordering::SeqCst);
        self.annotator
            .update_container(&self.container, &self.selector, self.view_type.as_deref())
    }
}

/// Rescans one container whenever its subtree gains or loses children.
pub struct ContainerWatcher {
    /// State reachable from the mutation callback.
    shared: Arc<RescanShared>,
    /// Live subscription; `None` once disconnected.
    subscription: Option<Box<dyn Subscription>>,
}

impl std::fmt::Debug for ContainerWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerWatcher")
            .field("container", &self.shared.container.id())
            .field("selector", &self.shared.selector.to_string())
            .field("view_type", &self.shared.view_type)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ContainerWatcher {
    /// Install a subscription over `container`.
    pub fn watch(
        ctx: &WatchContext,
        container: ElementRef,
        selector: Selector,
        view_type: Option<String>,
    ) -> Self {
        let shared = Arc::new(RescanShared {
            container,
            selector,
            view_type,
            annotator: ctx.annotator.clone(),
            frames: ctx.frames.clone(),
            scheduled: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            rescans: AtomicU64::new(0),
        });
        let weak = Arc::downgrade(&shared);
        let callback: MutationCallback = Arc::new(move |records: &[MutationRecord]| {
            if let Some(shared) = weak.upgrade() {
                shared.on_records(records);
            }
        });
        let subscription = ctx.observer.observe(
            &shared.container,
            ObserveOptions::subtree_child_list(),
            callback,
        );
        Self {
            shared,
            subscription: Some(subscription),
        }
    }

    /// Rescan right now, outside the frame clock.
    pub fn rescan(&self) -> usize {
        self.shared.rescan()
    }

    /// A frame-aligned rescan is pending.
    pub fn is_scheduled(&self) -> bool {
        self.shared.scheduled.load(Ordering::SeqCst)
    }

    /// Rescans run so far, forced or scheduled.
    pub fn rescans(&self) -> u64 {
        self.shared.rescans.load(Ordering::SeqCst)
    }

    /// Watched subtree root.
    pub fn container(&self) -> &ElementRef {
        &self.shared.container
    }

    /// Selector applied on each rescan.
    pub fn selector(&self) -> &Selector {
        &self.shared.selector
    }

    /// Whether the subscription is still live.
    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    /// Stop watching. A rescan already queued on the frame clock becomes a
    /// no-op. Annotations are left in place.
    pub fn disconnect(&mut self) -> Result<()> {
        self.shared.alive.store(false, Ordering::SeqCst);
        self.shared.scheduled.store(false, Ordering::SeqCst);
        match self.subscription.take() {
            Some(mut sub) => sub.disconnect(),
            None => Ok(()),
        }
    }
}

impl Drop for ContainerWatcher {
    fn drop(&mut self) {
        let _ignored = self.disconnect();
    }
}

/// State shared between a [`DynamicContainerWatcher`] and its callbacks.
struct DynamicShared {
    /// Watched subtree root.
    container: ElementRef,
    /// Class of the elements to annotate.
    own_class: String,
    /// Class an inserted node needs before it is searched.
    parent_class: String,
    /// Drains found elements a chunk per frame.
    queue: ChunkedScheduler<ElementRef>,
    /// Cleared on disconnect.
    alive: AtomicBool,
    /// Elements handed to the queue.
    enqueued: AtomicU64,
}

impl DynamicShared {
    /// Queue the targets of inserted items.
    fn on_records(&self, records: &[MutationRecord]) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        let mut found = Vec::new();
        for record in records.iter().filter(|r| r.kind == MutationKind::ChildList) {
            for node in &record.added {
                let is_item = node
                    .class_name()
                    .is_some_and(|c| c.contains(self.parent_class.as_str()));
                if is_item {
                    found.extend(elements_by_class(node.as_ref(), &self.own_class));
                }
            }
        }
        if found.is_empty() {
            return;
        }
        self.enqueued.fetch_add(found.len() as u64, Ordering::SeqCst);
        trace!(container = %self.container.id(), items = found.len(), "dynamic_enqueue");
        self.queue.schedule(found);
    }
}

/// Watches an incrementally populated container and annotates only the
/// target elements of inserted items.
pub struct DynamicContainerWatcher {
    /// State reachable from the mutation callback.
    shared: Arc<DynamicShared>,
    /// Full selector used by [`Self::rescan`].
    selector: Selector,
    /// View type handed to the renderer.
    view_type: String,
    /// Applies annotations on full passes.
    annotator: Annotator,
    /// Live subscription; `None` once disconnected.
    subscription: Option<Box<dyn Subscription>>,
}

impl std::fmt::Debug for DynamicContainerWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicContainerWatcher")
            .field("container", &self.shared.container.id())
            .field("view_type", &self.view_type)
            .field("queue", &self.shared.queue)
            .finish()
    }
}

impl DynamicContainerWatcher {
    /// Install a subscription over `container` for the row `desc`.
    pub fn watch(
        ctx: &WatchContext,
        container: ElementRef,
        desc: &ViewTypeDescriptor,
        chunk_size: usize,
    ) -> Self {
        let view_type = desc.view_type().to_string();
        let worker_annotator = ctx.annotator.clone();
        let worker_view_type = view_type.clone();
        let queue = ChunkedScheduler::new(
            "dynamic",
            ctx.frames.clone(),
            chunk_size,
            Arc::new(move |el: ElementRef| {
                worker_annotator.update_element(&el, Some(&worker_view_type));
            }),
        );
        let shared = Arc::new(DynamicShared {
            container,
            own_class: desc.own_class.clone(),
            parent_class: desc.parent_class.clone(),
            queue,
            alive: AtomicBool::new(true),
            enqueued: AtomicU64::new(0),
        });
        let weak = Arc::downgrade(&shared);
        let callback: MutationCallback = Arc::new(move |records: &[MutationRecord]| {
            if let Some(shared) = weak.upgrade() {
                shared.on_records(records);
            }
        });
        let subscription = ctx.observer.observe(
            &shared.container,
            ObserveOptions::subtree_child_list(),
            callback,
        );
        Self {
            shared,
            selector: desc.selector.clone(),
            view_type,
            annotator: ctx.annotator.clone(),
            subscription: Some(subscription),
        }
    }

    /// Full pass over the container, outside the frame clock.
    pub fn rescan(&self) -> usize {
        self.annotator
            .update_container(&self.shared.container, &self.selector, Some(&self.view_type))
    }

    /// Elements waiting for a drain to pick them up.
    pub fn pending(&self) -> usize {
        self.shared.queue.pending()
    }

    /// Nothing queued and no drain in flight.
    pub fn is_idle(&self) -> bool {
        self.shared.queue.is_idle()
    }

    /// Elements enqueued so far.
    pub fn enqueued(&self) -> u64 {
        self.shared.enqueued.load(Ordering::SeqCst)
    }

    /// Watched subtree root.
    pub fn container(&self) -> &ElementRef {
        &self.shared.container
    }

    /// Whether the subscription is still live.
    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    /// Stop watching and abandon queued work. Annotations are left in place.
    pub fn disconnect(&mut self) -> Result<()> {
        self.shared.alive.store(false, Ordering::SeqCst);
        self.shared.queue.cancel();
        match self.subscription.take() {
            Some(mut sub) => sub.disconnect(),
            None => Ok(()),
        }
    }
}

impl Drop for DynamicContainerWatcher {
    fn drop(&mut self) {
        let _ignored = self.disconnect();
    }
}
