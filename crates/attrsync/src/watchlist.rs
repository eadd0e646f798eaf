//! Arena of active view watchers owned by one orchestrator.

use std::collections::{BTreeMap, HashMap};

use tracing::{trace, warn};

use crate::{
    annotate::Annotator,
    dom::{ElementRef, NodeId},
    error::{Error, Result},
    registry::RowKey,
    selector::Selector,
    watcher::{ContainerWatcher, DynamicContainerWatcher},
};

/// Synthetic id of a [`WatchHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(
    /// Monotonic counter value, unique within one list.
    pub u64,
);

/// The two watcher flavors behind a handle.
#[derive(Debug)]
pub enum Watcher {
    /// Rescans the whole container per frame.
    Full(ContainerWatcher),
    /// Annotates only inserted items.
    Dynamic(DynamicContainerWatcher),
}

impl Watcher {
    /// Stop the underlying subscription.
    fn disconnect(&mut self) -> Result<()> {
        match self {
            Self::Full(w) => w.disconnect(),
            Self::Dynamic(w) => w.disconnect(),
        }
    }

    /// Whether the underlying subscription is live.
    fn is_connected(&self) -> bool {
        match self {
            Self::Full(w) => w.is_connected(),
            Self::Dynamic(w) => w.is_connected(),
        }
    }
}

/// One active subscription bound to exactly one container.
#[derive(Debug)]
pub struct WatchHandle {
    /// Id assigned on insert.
    pub id: WatchId,
    /// Registry row this handle serves.
    pub key: RowKey,
    /// Selector used for refreshes and teardown clears.
    pub selector: Selector,
    /// The watched view instance.
    pub container: ElementRef,
    /// The live watcher.
    pub watcher: Watcher,
}

impl WatchHandle {
    /// View type of the row.
    pub fn view_type(&self) -> &str {
        &self.key.view_type
    }

    /// Whether the handle uses a dynamic watcher.
    pub fn is_dynamic(&self) -> bool {
        matches!(self.watcher, Watcher::Dynamic(_))
    }

    /// Whether the watcher's subscription is live.
    pub fn is_connected(&self) -> bool {
        self.watcher.is_connected()
    }
}

/// At most one handle per (container, row) pair.
#[derive(Debug, Default)]
pub struct WatchList {
    /// Handles in insertion order.
    handles: BTreeMap<WatchId, WatchHandle>,
    /// Index from (container, row) to handle.
    by_key: HashMap<(NodeId, RowKey), WatchId>,
    /// Last id handed out.
    next_id: u64,
}

impl WatchList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the watcher produced by `build`. Any prior handle for the
    /// same (container, row) pair is disconnected before `build` runs, so the
    /// old and new subscriptions never overlap.
    pub fn insert<F>(
        &mut self,
        key: RowKey,
        selector: Selector,
        container: ElementRef,
        build: F,
    ) -> WatchId
    where
        F: FnOnce(&ElementRef) -> Watcher,
    {
        if let Some(Err(e)) = self.remove(container.id(), &key) {
            warn!(key = %key, error = %e, "watch_disconnect_failed");
        }
        let slot = (container.id(), key.clone());
        let watcher = build(&container);
        self.next_id += 1;
        let id = WatchId(self.next_id);
        self.handles.insert(
            id,
            WatchHandle {
                id,
                key,
                selector,
                container,
                watcher,
            },
        );
        self.by_key.insert(slot, id);
        id
    }

    /// Disconnect and drop the handle for a (container, row) pair. Returns
    /// `None` when no handle exists, else the disconnect outcome.
    pub fn remove(&mut self, container: NodeId, key: &RowKey) -> Option<Result<()>> {
        let id = self.by_key.remove(&(container, key.clone()))?;
        let mut old = self.handles.remove(&id)?;
        trace!(key = %old.key, container = %old.container.id(), "watch_replace");
        Some(old.watcher.disconnect())
    }

    /// Handle by id.
    pub fn get(&self, id: WatchId) -> Option<&WatchHandle> {
        self.handles.get(&id)
    }

    /// Handle for a (container, row) pair.
    pub fn find(&self, container: NodeId, key: &RowKey) -> Option<&WatchHandle> {
        self.by_key
            .get(&(container, key.clone()))
            .and_then(|id| self.handles.get(id))
    }

    /// Handles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &WatchHandle> {
        self.handles.values()
    }

    /// Number of handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the list holds no handles.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Disconnect every handle and empty the list without touching
    /// annotations.
    pub fn disconnect_all(&mut self) -> Vec<Error> {
        self.by_key.clear();
        let mut errors = Vec::new();
        for (_, mut handle) in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.watcher.disconnect() {
                warn!(key = %handle.key, error = %e, "watch_disconnect_failed");
                errors.push(e);
            }
        }
        errors
    }

    /// Disconnect every handle, clear annotations from each container, and
    /// empty the list. Each handle is handled independently. Returns the
    /// number of elements cleared and any disconnect errors.
    pub fn teardown(&mut self, annotator: &Annotator) -> (usize, Vec<Error>) {
        self.by_key.clear();
        let mut cleared = 0;
        let mut errors = Vec::new();
        for (_, mut handle) in std::mem::take(&mut self.handles) {
            let res = handle.watcher.disconnect();
            cleared += annotator.clear_container(&handle.container, &handle.selector);
            if let Err(e) = res {
                warn!(key = %handle.key, error = %e, "watch_disconnect_failed");
                errors.push(e);
            }
        }
        (cleared, errors)
    }
}
