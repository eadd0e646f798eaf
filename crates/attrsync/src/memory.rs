//! In-memory document host.
//!
//! [`Document`] is a small arena DOM that implements [`Element`] and
//! [`Observer`]. Mutations queue records per observer; [`Document::flush`]
//! delivers everything queued since the previous flush as one batch per
//! observer, the way a browser delivers records at a microtask checkpoint.

use std::{
    collections::{BTreeMap, HashMap},
    mem,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    dom::{
        Element, ElementRef, MutationCallback, MutationKind, MutationRecord, NodeId,
        ObserveOptions, Observer, Subscription,
    },
    error::Result,
    host::{HostOptions, Workspace},
};

/// Node ids are unique across documents so several windows can coexist.
static NEXT_NODE: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh node id.
fn next_node_id() -> NodeId {
    NodeId(NEXT_NODE.fetch_add(1, Ordering::Relaxed))
}

/// Class field of a node.
#[derive(Debug, Clone)]
enum ClassName {
    /// Space separated class list.
    Text(String),
    /// Host quirk: a class field that is not a plain string.
    Opaque,
}

/// Arena slot for one node.
#[derive(Debug)]
struct NodeData {
    /// Lowercase tag name.
    tag: String,
    /// Class field.
    class: ClassName,
    /// Attributes by name.
    attrs: BTreeMap<String, String>,
    /// Parent node, `None` when detached or for the body.
    parent: Option<NodeId>,
    /// Children in document order.
    children: Vec<NodeId>,
}

/// A live subscription.
struct ObserverEntry {
    /// Observed root.
    root: NodeId,
    /// What to report.
    options: ObserveOptions,
    /// Batch callback.
    callback: MutationCallback,
}

/// Shared state of a [`Document`].
struct DocInner {
    /// Every node ever created, attached or not.
    nodes: HashMap<NodeId, NodeData>,
    /// The root node.
    body: NodeId,
    /// Live subscriptions by id.
    observers: BTreeMap<u64, ObserverEntry>,
    /// Records queued per subscription since the last flush.
    pending: BTreeMap<u64, Vec<MutationRecord>>,
    /// Next subscription id.
    next_observer: u64,
}

impl DocInner {
    /// Whether `ancestor` is a strict ancestor of `node`.
    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        while let Some(parent) = self.nodes.get(&node).and_then(|n| n.parent) {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }

    /// Queue `record` for every subscription that wants it.
    fn queue(&mut self, record: MutationRecord) {
        let target = record.target.id();
        let ids: Vec<u64> = self
            .observers
            .iter()
            .filter(|(_, entry)| {
                let wanted = match record.kind {
                    MutationKind::ChildList => entry.options.child_list,
                    MutationKind::Attributes => entry.options.attributes,
                };
                wanted
                    && (entry.root == target
                        || (entry.options.subtree && self.is_ancestor(entry.root, target)))
            })
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.pending.entry(id).or_default().push(record.clone());
        }
    }

    /// Unlink `child` from its parent and queue the removal record.
    fn detach(&mut self, weak: &Weak<Mutex<Self>>, child: NodeId) {
        let Some(parent) = self.nodes.get_mut(&child).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != child);
        }
        self.queue(MutationRecord {
            kind: MutationKind::ChildList,
            target: handle(weak, parent),
            added: Vec::new(),
            removed: vec![handle(weak, child)],
        });
    }
}

/// Element handle for `id`.
fn handle(weak: &Weak<Mutex<DocInner>>, id: NodeId) -> ElementRef {
    Arc::new(MemElement {
        doc: weak.clone(),
        id,
    })
}

/// An arena-backed document.
#[derive(Clone)]
pub struct Document {
    /// Shared arena.
    inner: Arc<Mutex<DocInner>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Document")
            .field("nodes", &inner.nodes.len())
            .field("observers", &inner.observers.len())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Create an empty document with a `body` root.
    pub fn new() -> Self {
        let body = next_node_id();
        let mut nodes = HashMap::new();
        nodes.insert(
            body,
            NodeData {
                tag: "body".to_string(),
                class: ClassName::Text(String::new()),
                attrs: BTreeMap::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            inner: Arc::new(Mutex::new(DocInner {
                nodes,
                body,
                observers: BTreeMap::new(),
                pending: BTreeMap::new(),
                next_observer: 1,
            })),
        }
    }

    /// Weak reference handed to element handles.
    fn weak(&self) -> Weak<Mutex<DocInner>> {
        Arc::downgrade(&self.inner)
    }

    /// The document root.
    pub fn body(&self) -> ElementRef {
        let body = self.inner.lock().body;
        handle(&self.weak(), body)
    }

    /// Look up a node by id.
    pub fn element(&self, id: NodeId) -> Option<ElementRef> {
        let known = self.inner.lock().nodes.contains_key(&id);
        known.then(|| handle(&self.weak(), id))
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str, class: &str) -> ElementRef {
        let id = next_node_id();
        self.inner.lock().nodes.insert(
            id,
            NodeData {
                tag: tag.to_string(),
                class: ClassName::Text(class.to_string()),
                attrs: BTreeMap::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        handle(&self.weak(), id)
    }

    /// Append `child` to `parent`, moving it if it is already attached.
    ///
    /// Returns `false` and changes nothing when either node is unknown or the
    /// append would make `child` its own ancestor.
    pub fn append_child(&self, parent: &ElementRef, child: &ElementRef) -> bool {
        let weak = self.weak();
        let mut inner = self.inner.lock();
        let (pid, cid) = (parent.id(), child.id());
        if !inner.nodes.contains_key(&pid) || !inner.nodes.contains_key(&cid) {
            return false;
        }
        if pid == cid || inner.is_ancestor(cid, pid) {
            trace!(parent = %pid, child = %cid, "append_rejected_cycle");
            return false;
        }
        inner.detach(&weak, cid);
        if let Some(p) = inner.nodes.get_mut(&pid) {
            p.children.push(cid);
        }
        if let Some(c) = inner.nodes.get_mut(&cid) {
            c.parent = Some(pid);
        }
        inner.queue(MutationRecord {
            kind: MutationKind::ChildList,
            target: handle(&weak, pid),
            added: vec![handle(&weak, cid)],
            removed: Vec::new(),
        });
        true
    }

    /// Detach `el` from its parent, if any.
    pub fn remove(&self, el: &ElementRef) {
        let weak = self.weak();
        self.inner.lock().detach(&weak, el.id());
    }

    /// Replace an element's class list.
    pub fn set_class_name(&self, el: &ElementRef, class: &str) {
        if let Some(node) = self.inner.lock().nodes.get_mut(&el.id()) {
            node.class = ClassName::Text(class.to_string());
        }
    }

    /// Make an element report a non-string class field.
    pub fn set_opaque_class_name(&self, el: &ElementRef) {
        if let Some(node) = self.inner.lock().nodes.get_mut(&el.id()) {
            node.class = ClassName::Opaque;
        }
    }

    /// Deliver queued records, one batch per observer. Returns the number of
    /// callbacks invoked.
    pub fn flush(&self) -> usize {
        let batches: Vec<(MutationCallback, Vec<MutationRecord>)> = {
            let mut inner = self.inner.lock();
            let pending = mem::take(&mut inner.pending);
            pending
                .into_iter()
                .filter_map(|(id, records)| {
                    inner
                        .observers
                        .get(&id)
                        .map(|e| (e.callback.clone(), records))
                })
                .collect()
        };
        let delivered = batches.len();
        for (callback, records) in batches {
            callback(&records);
        }
        if delivered > 0 {
            trace!(delivered, "mutation_flush");
        }
        delivered
    }

    /// Number of live subscriptions.
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

impl Observer for Document {
    fn observe(
        &self,
        root: &ElementRef,
        options: ObserveOptions,
        callback: MutationCallback,
    ) -> Box<dyn Subscription> {
        let mut inner = self.inner.lock();
        let id = inner.next_observer;
        inner.next_observer += 1;
        inner.observers.insert(
            id,
            ObserverEntry {
                root: root.id(),
                options,
                callback,
            },
        );
        Box::new(MemSubscription {
            doc: self.weak(),
            id,
        })
    }
}

/// Subscription handle returned by [`Document::observe`].
struct MemSubscription {
    /// Owning document.
    doc: Weak<Mutex<DocInner>>,
    /// Key into the observer table.
    id: u64,
}

impl Subscription for MemSubscription {
    fn disconnect(&mut self) -> Result<()> {
        if let Some(doc) = self.doc.upgrade() {
            let mut inner = doc.lock();
            inner.observers.remove(&self.id);
            inner.pending.remove(&self.id);
        }
        Ok(())
    }
}

/// Handle to one node of a [`Document`].
struct MemElement {
    /// Owning document; handles outliving it read as empty and detached.
    doc: Weak<Mutex<DocInner>>,
    /// Node id.
    id: NodeId,
}

impl std::fmt::Debug for MemElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (tag, class) = self
            .read(|n| {
                let class = match &n.class {
                    ClassName::Text(c) => c.clone(),
                    ClassName::Opaque => "<opaque>".to_string(),
                };
                (n.tag.clone(), class)
            })
            .unwrap_or_default();
        f.debug_struct("MemElement")
            .field("id", &self.id)
            .field("tag", &tag)
            .field("class", &class)
            .finish()
    }
}

impl MemElement {
    /// Run `f` against this node's arena slot.
    fn read<R>(&self, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        let doc = self.doc.upgrade()?;
        let inner = doc.lock();
        inner.nodes.get(&self.id).map(f)
    }
}

impl Element for MemElement {
    fn id(&self) -> NodeId {
        self.id
    }

    fn tag_name(&self) -> String {
        self.read(|n| n.tag.clone()).unwrap_or_default()
    }

    fn class_name(&self) -> Option<String> {
        self.read(|n| match &n.class {
            ClassName::Text(c) => Some(c.clone()),
            ClassName::Opaque => None,
        })
        .flatten()
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.read(|n| n.attrs.get(name).cloned()).flatten()
    }

    fn set_attr(&self, name: &str, value: &str) {
        let Some(doc) = self.doc.upgrade() else {
            return;
        };
        let mut inner = doc.lock();
        let changed = match inner.nodes.get_mut(&self.id) {
            Some(node) => {
                let prior = node.attrs.insert(name.to_string(), value.to_string());
                prior.as_deref() != Some(value)
            }
            None => false,
        };
        if changed {
            inner.queue(MutationRecord {
                kind: MutationKind::Attributes,
                target: handle(&self.doc, self.id),
                added: Vec::new(),
                removed: Vec::new(),
            });
        }
    }

    fn remove_attr(&self, name: &str) {
        let Some(doc) = self.doc.upgrade() else {
            return;
        };
        let mut inner = doc.lock();
        let removed = inner
            .nodes
            .get_mut(&self.id)
            .is_some_and(|node| node.attrs.remove(name).is_some());
        if removed {
            inner.queue(MutationRecord {
                kind: MutationKind::Attributes,
                target: handle(&self.doc, self.id),
                added: Vec::new(),
                removed: Vec::new(),
            });
        }
    }

    fn parent(&self) -> Option<ElementRef> {
        self.read(|n| n.parent)
            .flatten()
            .map(|p| handle(&self.doc, p))
    }

    fn children(&self) -> Vec<ElementRef> {
        self.read(|n| n.children.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|c| handle(&self.doc, c))
            .collect()
    }

    fn is_connected(&self) -> bool {
        let Some(doc) = self.doc.upgrade() else {
            return false;
        };
        let inner = doc.lock();
        self.id == inner.body || inner.is_ancestor(inner.body, self.id)
    }
}

/// A [`Workspace`] whose view instances are containers inside a [`Document`].
#[derive(Debug)]
pub struct MemoryWorkspace {
    /// Document holding every container.
    document: Document,
    /// Open containers per view type, in open order.
    leaves: Mutex<BTreeMap<String, Vec<ElementRef>>>,
    /// Reported host capabilities.
    options: Mutex<HostOptions>,
}

impl MemoryWorkspace {
    /// Create a workspace over `document` with no open views.
    pub fn new(document: Document) -> Self {
        Self {
            document,
            leaves: Mutex::new(BTreeMap::new()),
            options: Mutex::new(HostOptions::default()),
        }
    }

    /// The backing document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Open a view instance of `view_type` and return its container.
    pub fn open_leaf(&self, view_type: &str) -> ElementRef {
        let container = self.document.create_element("div", "view-content");
        container.set_attr("data-type", view_type);
        self.document.append_child(&self.document.body(), &container);
        self.leaves
            .lock()
            .entry(view_type.to_string())
            .or_default()
            .push(container.clone());
        container
    }

    /// Close a view instance and detach its container.
    pub fn close_leaf(&self, view_type: &str, container: &ElementRef) {
        if let Some(list) = self.leaves.lock().get_mut(view_type) {
            list.retain(|c| c.id() != container.id());
        }
        self.document.remove(container);
    }

    /// Replace the reported host options.
    pub fn set_options(&self, options: HostOptions) {
        *self.options.lock() = options;
    }
}

impl Workspace for MemoryWorkspace {
    fn leaves_of_type(&self, view_type: &str) -> Vec<ElementRef> {
        self.leaves
            .lock()
            .get(view_type)
            .cloned()
            .unwrap_or_default()
    }

    fn document_root(&self) -> ElementRef {
        self.document.body()
    }

    fn options(&self) -> HostOptions {
        *self.options.lock()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::dom::descendants;

    fn counting(counter: &Arc<AtomicUsize>) -> MutationCallback {
        let counter = counter.clone();
        Arc::new(move |records: &[MutationRecord]| {
            counter.fetch_add(records.len(), Ordering::SeqCst);
        })
    }

    #[test]
    fn records_are_batched_until_flush() {
        let doc = Document::new();
        let root = doc.body();
        let seen = Arc::new(AtomicUsize::new(0));
        let _sub = doc.observe(&root, ObserveOptions::subtree_child_list(), counting(&seen));

        for _ in 0..5 {
            let child = doc.create_element("div", "x");
            doc.append_child(&root, &child);
        }
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(doc.flush(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(doc.flush(), 0);
    }

    #[test]
    fn direct_observers_ignore_deep_changes() {
        let doc = Document::new();
        let root = doc.body();
        let wrapper = doc.create_element("div", "wrapper");
        doc.append_child(&root, &wrapper);
        doc.flush();

        let seen = Arc::new(AtomicUsize::new(0));
        let _sub = doc.observe(&root, ObserveOptions::direct_child_list(), counting(&seen));
        let deep = doc.create_element("div", "deep");
        doc.append_child(&wrapper, &deep);
        doc.flush();
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        let top = doc.create_element("div", "top");
        doc.append_child(&root, &top);
        doc.flush();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disconnect_drops_pending_records() {
        let doc = Document::new();
        let root = doc.body();
        let seen = Arc::new(AtomicUsize::new(0));
        let mut sub = doc.observe(&root, ObserveOptions::subtree_child_list(), counting(&seen));
        let child = doc.create_element("div", "x");
        doc.append_child(&root, &child);
        sub.disconnect().unwrap();
        sub.disconnect().unwrap();
        doc.flush();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn connectivity_follows_parent_chain() {
        let doc = Document::new();
        let ws = MemoryWorkspace::new(doc.clone());
        let container = ws.open_leaf("search");
        let item = doc.create_element("div", "tree-item");
        assert!(!item.is_connected());
        doc.append_child(&container, &item);
        assert!(item.is_connected());

        ws.close_leaf("search", &container);
        assert!(!item.is_connected());
        assert!(ws.leaves_of_type("search").is_empty());
    }

    #[test]
    fn attribute_changes_only_reach_attribute_observers() {
        let doc = Document::new();
        let root = doc.body();
        let el = doc.create_element("a", "internal-link");
        doc.append_child(&root, &el);
        doc.flush();

        let structural = Arc::new(AtomicUsize::new(0));
        let attrs = Arc::new(AtomicUsize::new(0));
        let _a = doc.observe(&root, ObserveOptions::subtree_child_list(), counting(&structural));
        let _b = doc.observe(
            &root,
            ObserveOptions {
                attributes: true,
                subtree: true,
                child_list: false,
            },
            counting(&attrs),
        );
        el.set_attr("data-annotated", "1");
        el.set_attr("data-annotated", "1");
        doc.flush();
        assert_eq!(structural.load(Ordering::SeqCst), 0);
        assert_eq!(attrs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn appending_an_ancestor_into_its_descendant_is_rejected() {
        let doc = Document::new();
        let root = doc.body();
        let a = doc.create_element("div", "a");
        let b = doc.create_element("div", "b");
        assert!(doc.append_child(&root, &a));
        assert!(doc.append_child(&a, &b));
        doc.flush();

        let seen = Arc::new(AtomicUsize::new(0));
        let _sub = doc.observe(&root, ObserveOptions::subtree_child_list(), counting(&seen));
        assert!(!doc.append_child(&b, &a));
        assert!(!doc.append_child(&a, &a));

        assert!(a.is_connected());
        assert!(b.is_connected());
        assert_eq!(b.parent().map(|p| p.id()), Some(a.id()));
        assert_eq!(descendants(root.as_ref()).len(), 2);
        doc.flush();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
