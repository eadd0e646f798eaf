//! Test doubles for the host collaborators.
//! These are public so integration tests and the simulator can share them.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::{
    dom::{ElementRef, MutationCallback, NodeId, ObserveOptions, Observer, Subscription},
    error::{Error, Result},
    host::Renderer,
};

/// Attribute painted by [`RecordingRenderer`].
pub const ANNOTATION_ATTR: &str = "data-attrsync";

/// Renderer that records every call and paints a marker attribute.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    /// `render_into` calls with their view type.
    renders: Mutex<Vec<(NodeId, Option<String>)>>,
    /// `clear` calls.
    clears: Mutex<Vec<NodeId>>,
    /// `render_links_in` calls.
    post_processed: Mutex<Vec<NodeId>>,
    /// `refresh_visible` calls.
    visible_refreshes: AtomicUsize,
}

impl RecordingRenderer {
    /// Create a shared recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total `render_into` calls.
    pub fn render_count(&self) -> usize {
        self.renders.lock().len()
    }

    /// `render_into` calls for one element.
    pub fn renders_of(&self, id: NodeId) -> usize {
        self.renders.lock().iter().filter(|(n, _)| *n == id).count()
    }

    /// View-type tags passed for one element, in call order.
    pub fn view_types_of(&self, id: NodeId) -> Vec<Option<String>> {
        self.renders
            .lock()
            .iter()
            .filter(|(n, _)| *n == id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Total `clear` calls.
    pub fn clear_count(&self) -> usize {
        self.clears.lock().len()
    }

    /// Whether `clear` was called for one element.
    pub fn cleared(&self, id: NodeId) -> bool {
        self.clears.lock().contains(&id)
    }

    /// `refresh_visible` calls.
    pub fn visible_refreshes(&self) -> usize {
        self.visible_refreshes.load(Ordering::SeqCst)
    }

    /// Elements passed to `render_links_in`.
    pub fn post_processed(&self) -> Vec<NodeId> {
        self.post_processed.lock().clone()
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        self.renders.lock().clear();
        self.clears.lock().clear();
        self.post_processed.lock().clear();
        self.visible_refreshes.store(0, Ordering::SeqCst);
    }
}

impl Renderer for RecordingRenderer {
    fn render_into(&self, el: &ElementRef, view_type: Option<&str>, _hint: &str) {
        self.renders
            .lock()
            .push((el.id(), view_type.map(str::to_string)));
        el.set_attr(ANNOTATION_ATTR, view_type.unwrap_or("overlay"));
    }

    fn clear(&self, el: &ElementRef) {
        self.clears.lock().push(el.id());
        el.remove_attr(ANNOTATION_ATTR);
    }

    fn refresh_visible(&self) {
        self.visible_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn render_links_in(&self, el: &ElementRef) {
        self.post_processed.lock().push(el.id());
    }
}

/// Observer wrapper whose every `fail_every`-th subscription refuses to
/// disconnect.
pub struct FlakyObserver {
    /// Observer doing the real work.
    inner: Arc<dyn Observer>,
    /// Period of failing subscriptions.
    fail_every: usize,
    /// Subscriptions created.
    created: AtomicUsize,
    /// Failed disconnects, shared with subscriptions.
    failures: Arc<AtomicUsize>,
}

impl FlakyObserver {
    /// Wrap `inner`; every `fail_every`-th subscription fails to disconnect.
    pub fn new(inner: Arc<dyn Observer>, fail_every: usize) -> Self {
        Self {
            inner,
            fail_every: fail_every.max(1),
            created: AtomicUsize::new(0),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Disconnects that failed so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl Observer for FlakyObserver {
    fn observe(
        &self,
        root: &ElementRef,
        options: ObserveOptions,
        callback: MutationCallback,
    ) -> Box<dyn Subscription> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Box::new(FlakySubscription {
            inner: self.inner.observe(root, options, callback),
            fails: n % self.fail_every == 0,
            failures: self.failures.clone(),
        })
    }
}

/// Subscription handed out by [`FlakyObserver`].
struct FlakySubscription {
    /// Real subscription.
    inner: Box<dyn Subscription>,
    /// Whether disconnect reports an error.
    fails: bool,
    /// Failure counter of the owning observer.
    failures: Arc<AtomicUsize>,
}

impl Subscription for FlakySubscription {
    fn disconnect(&mut self) -> Result<()> {
        if self.fails {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Subscription("host refused to disconnect".to_string()));
        }
        self.inner.disconnect()
    }
}
