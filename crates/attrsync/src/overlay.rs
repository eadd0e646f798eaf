//! Detection of transient overlays (modals, suggestion popups).
//!
//! One [`OverlayWatcher`] sits on each window's document root and looks only
//! at nodes inserted directly under it. Nodes whose class name carries an
//! overlay marker are queued; each drained entry gets one immediate
//! annotation pass plus its own [`ContainerWatcher`] so later changes inside
//! the overlay (typing, re-filtering) stay annotated.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    annotate::Annotator,
    config::OverlaySettings,
    dom::{
        ElementRef, MutationCallback, MutationKind, MutationRecord, NodeId, ObserveOptions,
        Subscription,
    },
    error::{Error, Result},
    scheduler::ChunkedScheduler,
    selector::Selector,
    watcher::{ContainerWatcher, WatchContext},
};

/// Overlay classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    /// Dialogs such as search or quick switcher modals.
    Modal,
    /// Inline suggestion popups.
    Suggestion,
}

/// Maps an overlay node's class name to a kind and a selector list.
#[derive(Debug, Clone)]
pub struct OverlayClassifier {
    /// Class-name substring marking a modal.
    modal_marker: String,
    /// Class-name substring marking a suggestion popup.
    suggestion_marker: String,
    /// Targets inside modals.
    modal_selector: Selector,
    /// Targets inside suggestion popups.
    suggestion_selector: Selector,
}

impl OverlayClassifier {
    /// Build a classifier from configured markers and selector lists.
    pub fn from_settings(settings: &OverlaySettings) -> Result<Self> {
        Ok(Self {
            modal_marker: settings.modal_marker.clone(),
            suggestion_marker: settings.suggestion_marker.clone(),
            modal_selector: Selector::parse(&settings.modal_selector)?,
            suggestion_selector: Selector::parse(&settings.suggestion_selector)?,
        })
    }

    /// Classify by class-name substring. Suggestion wins over modal.
    pub fn classify(&self, class_name: &str) -> Option<OverlayKind> {
        if class_name.contains(self.suggestion_marker.as_str()) {
            Some(OverlayKind::Suggestion)
        } else if class_name.contains(self.modal_marker.as_str()) {
            Some(OverlayKind::Modal)
        } else {
            None
        }
    }

    /// Selector list used for overlays of `kind`.
    pub fn selector(&self, kind: OverlayKind) -> &Selector {
        match kind {
            OverlayKind::Modal => &self.modal_selector,
            OverlayKind::Suggestion => &self.suggestion_selector,
        }
    }
}

/// A queued unit of overlay work.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    /// The overlay node.
    pub node: ElementRef,
    /// Selector matching its targets.
    pub selector: Selector,
}

/// Per-overlay watchers keyed by overlay node.
type ChildWatchers = Arc<Mutex<HashMap<NodeId, ContainerWatcher>>>;

/// State shared between an [`OverlayWatcher`] and its callbacks.
struct OverlayShared {
    /// Watched document root.
    root: ElementRef,
    /// Decides which inserted nodes are overlays.
    classifier: OverlayClassifier,
    /// Drains detected overlays a chunk per frame.
    queue: ChunkedScheduler<PendingUpdate>,
    /// Watchers of overlays still open.
    children: ChildWatchers,
    /// Cleared on teardown.
    alive: AtomicBool,
    /// Overlays detected.
    detected: AtomicU64,
}

impl OverlayShared {
    /// Drop watchers of removed overlays and queue newly inserted ones.
    fn on_records(&self, records: &[MutationRecord]) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        let mut found = Vec::new();
        for record in records.iter().filter(|r| r.kind == MutationKind::ChildList) {
            for node in &record.removed {
                let gone = self.children.lock().remove(&node.id());
                if let Some(mut watcher) = gone {
                    trace!(overlay = %node.id(), "overlay_closed");
                    let _ignored = watcher.disconnect();
                }
            }
            for node in &record.added {
                // Hosts may expose non-string class fields; those are never overlays.
                let Some(class_name) = node.class_name() else {
                    continue;
                };
                if let Some(kind) = self.classifier.classify(&class_name) {
                    found.push(PendingUpdate {
                        node: node.clone(),
                        selector: self.classifier.selector(kind).clone(),
                    });
                }
            }
        }
        if found.is_empty() {
            return;
        }
        self.detected.fetch_add(found.len() as u64, Ordering::SeqCst);
        debug!(root = %self.root.id(), overlays = found.len(), "overlay_detected");
        self.queue.schedule(found);
    }
}

/// Watches one document root for overlay insertions.
pub struct OverlayWatcher {
    /// State reachable from the mutation callback.
    shared: Arc<OverlayShared>,
    /// Root subscription; `None` once torn down.
    subscription: Option<Box<dyn Subscription>>,
}

impl std::fmt::Debug for OverlayWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayWatcher")
            .field("root", &self.shared.root.id())
            .field("children", &self.child_count())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl OverlayWatcher {
    /// Install the root subscription.
    pub fn watch(
        ctx: &WatchContext,
        root: ElementRef,
        classifier: OverlayClassifier,
        chunk_size: usize,
    ) -> Self {
        let children: ChildWatchers = Arc::new(Mutex::new(HashMap::new()));
        let worker_ctx = ctx.clone();
        let worker_children = children.clone();
        let queue = ChunkedScheduler::new(
            "overlay",
            ctx.frames.clone(),
            chunk_size,
            Arc::new(move |update: PendingUpdate| {
                install(&worker_ctx, &worker_children, update);
            }),
        );
        let shared = Arc::new(OverlayShared {
            root,
            classifier,
            queue,
            children,
            alive: AtomicBool::new(true),
            detected: AtomicU64::new(0),
        });
        let weak = Arc::downgrade(&shared);
        let callback: MutationCallback = Arc::new(move |records: &[MutationRecord]| {
            if let Some(shared) = weak.upgrade() {
                shared.on_records(records);
            }
        });
        let subscription =
            ctx.observer
                .observe(&shared.root, ObserveOptions::direct_child_list(), callback);
        Self {
            shared,
            subscription: Some(subscription),
        }
    }

    /// Watched document root.
    pub fn root(&self) -> &ElementRef {
        &self.shared.root
    }

    /// Overlays currently being watched.
    pub fn child_count(&self) -> usize {
        self.shared.children.lock().len()
    }

    /// Whether `node` has an installed overlay watcher.
    pub fn is_watching(&self, node: NodeId) -> bool {
        self.shared.children.lock().contains_key(&node)
    }

    /// Selector installed for a watched overlay.
    pub fn selector_for(&self, node: NodeId) -> Option<Selector> {
        self.shared
            .children
            .lock()
            .get(&node)
            .map(|w| w.selector().clone())
    }

    /// Overlays detected so far.
    pub fn detected(&self) -> u64 {
        self.shared.detected.load(Ordering::SeqCst)
    }

    /// Detected overlays not yet drained.
    pub fn pending(&self) -> usize {
        self.shared.queue.pending()
    }

    /// Whether the root subscription is still live.
    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    /// Disconnect the root subscription and every overlay watcher, clearing
    /// annotations inside overlays still being watched. Each watcher is
    /// handled independently.
    pub fn teardown(&mut self, annotator: &Annotator) -> (usize, Vec<Error>) {
        self.shared.alive.store(false, Ordering::SeqCst);
        self.shared.queue.cancel();

        let mut errors = Vec::new();
        if let Some(mut sub) = self.subscription.take()
            && let Err(e) = sub.disconnect()
        {
            warn!(root = %self.shared.root.id(), error = %e, "overlay_disconnect_failed");
            errors.push(e);
        }

        let children: Vec<ContainerWatcher> = {
            let mut map = self.shared.children.lock();
            map.drain().map(|(_, w)| w).collect()
        };
        let mut cleared = 0;
        for mut watcher in children {
            let res = watcher.disconnect();
            cleared += annotator.clear_container(watcher.container(), watcher.selector());
            if let Err(e) = res {
                warn!(overlay = %watcher.container().id(), error = %e, "overlay_disconnect_failed");
                errors.push(e);
            }
        }
        (cleared, errors)
    }
}

impl Drop for OverlayWatcher {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        self.shared.queue.cancel();
        if let Some(mut sub) = self.subscription.take() {
            let _ignored = sub.disconnect();
        }
    }
}

/// Annotate a drained overlay once and keep it watched. A watcher left over
/// for the same node is disconnected before the new one subscribes.
fn install(ctx: &WatchContext, children: &ChildWatchers, update: PendingUpdate) {
    let PendingUpdate { node, selector } = update;
    if !node.is_connected() {
        trace!(overlay = %node.id(), "overlay_gone_before_drain");
        return;
    }
    let prior = children.lock().remove(&node.id());
    if let Some(mut prior) = prior {
        trace!(overlay = %node.id(), "overlay_rewatch");
        let _ignored = prior.disconnect();
    }
    ctx.annotator.update_container(&node, &selector, None);
    let watcher = ContainerWatcher::watch(ctx, node.clone(), selector, None);
    children.lock().insert(node.id(), watcher);
}
