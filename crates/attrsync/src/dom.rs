//! Host document abstraction.
//!
//! The engine never talks to a concrete DOM. Hosts implement [`Element`] for
//! their nodes and [`Observer`] for their "watch this subtree for child
//! insertions/removals" primitive. The in-memory [`crate::memory::Document`]
//! implements both for tests and the headless simulator.

use std::{fmt, sync::Arc};

use crate::{error::Result, selector::Selector};

/// Process-unique identity of a host node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle to a host element.
pub type ElementRef = Arc<dyn Element>;

/// Read access to a host element, plus the attribute writes renderers need.
pub trait Element: Send + Sync + fmt::Debug {
    /// Stable identity of this node.
    fn id(&self) -> NodeId;
    /// Tag name, e.g. `div` or `a`.
    fn tag_name(&self) -> String;
    /// Space separated class list. `None` when the host exposes a class field
    /// that is not a plain string.
    fn class_name(&self) -> Option<String>;
    /// Attribute value, if present.
    fn attr(&self, name: &str) -> Option<String>;
    /// Set an attribute.
    fn set_attr(&self, name: &str, value: &str);
    /// Remove an attribute.
    fn remove_attr(&self, name: &str);
    /// Parent element, if attached to one.
    fn parent(&self) -> Option<ElementRef>;
    /// Child elements in document order.
    fn children(&self) -> Vec<ElementRef>;
    /// Whether the node is attached to its document.
    fn is_connected(&self) -> bool;
}

/// Whether `el` carries `class` in its class list.
pub fn has_class(el: &dyn Element, class: &str) -> bool {
    el.class_name()
        .is_some_and(|names| names.split_ascii_whitespace().any(|c| c == class))
}

/// All descendants of `root` in document (pre-)order, excluding `root`.
pub fn descendants(root: &dyn Element) -> Vec<ElementRef> {
    let mut out = Vec::new();
    let mut stack: Vec<ElementRef> = root.children().into_iter().rev().collect();
    while let Some(el) = stack.pop() {
        stack.extend(el.children().into_iter().rev());
        out.push(el);
    }
    out
}

/// Descendants of `root` matching `selector`, in document order.
pub fn find_all(root: &dyn Element, selector: &Selector) -> Vec<ElementRef> {
    descendants(root)
        .into_iter()
        .filter(|el| selector.matches(el.as_ref()))
        .collect()
}

/// Descendants of `root` carrying `class`, in document order.
pub fn elements_by_class(root: &dyn Element, class: &str) -> Vec<ElementRef> {
    descendants(root)
        .into_iter()
        .filter(|el| has_class(el.as_ref(), class))
        .collect()
}

/// What a structural-change subscription should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObserveOptions {
    /// Report child insertions and removals.
    pub child_list: bool,
    /// Extend observation to the whole subtree, not just direct children.
    pub subtree: bool,
    /// Report attribute changes.
    pub attributes: bool,
}

impl ObserveOptions {
    /// Child list changes anywhere below the root.
    pub fn subtree_child_list() -> Self {
        Self {
            child_list: true,
            subtree: true,
            attributes: false,
        }
    }

    /// Child list changes of the root's direct children only.
    pub fn direct_child_list() -> Self {
        Self {
            child_list: true,
            subtree: false,
            attributes: false,
        }
    }
}

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Children were inserted or removed.
    ChildList,
    /// An attribute changed.
    Attributes,
}

/// One structural change delivered to an observer callback.
#[derive(Debug, Clone)]
pub struct MutationRecord {
    /// Kind of change.
    pub kind: MutationKind,
    /// The node whose children or attributes changed.
    pub target: ElementRef,
    /// Inserted nodes.
    pub added: Vec<ElementRef>,
    /// Removed nodes.
    pub removed: Vec<ElementRef>,
}

/// Callback invoked with one batch of records.
pub type MutationCallback = Arc<dyn Fn(&[MutationRecord]) + Send + Sync>;

/// An active structural-change subscription.
pub trait Subscription: Send {
    /// Stop delivering records. Calling twice is a no-op.
    fn disconnect(&mut self) -> Result<()>;
}

/// The host's subtree-watching primitive.
pub trait Observer: Send + Sync {
    /// Start observing `root`; records are delivered in batches to `callback`.
    fn observe(
        &self,
        root: &ElementRef,
        options: ObserveOptions,
        callback: MutationCallback,
    ) -> Box<dyn Subscription>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Document;

    #[test]
    fn descendants_are_preorder_and_exclude_root() {
        let doc = Document::new();
        let root = doc.create_element("div", "root");
        let a = doc.create_element("div", "a");
        let a1 = doc.create_element("span", "a1");
        let b = doc.create_element("div", "b");
        doc.append_child(&root, &a);
        doc.append_child(&a, &a1);
        doc.append_child(&root, &b);

        let order: Vec<_> = descendants(root.as_ref())
            .iter()
            .filter_map(|e| e.class_name())
            .collect();
        assert_eq!(order, vec!["a", "a1", "b"]);
    }

    #[test]
    fn class_helpers_split_on_whitespace() {
        let doc = Document::new();
        let root = doc.create_element("div", "");
        let item = doc.create_element("div", "tree-item  is-clickable");
        let inner = doc.create_element("div", "tree-item-inner");
        doc.append_child(&root, &item);
        doc.append_child(&item, &inner);

        assert!(has_class(item.as_ref(), "tree-item"));
        assert!(!has_class(item.as_ref(), "tree"));
        assert_eq!(elements_by_class(root.as_ref(), "tree-item-inner").len(), 1);
        assert!(elements_by_class(inner.as_ref(), "tree-item-inner").is_empty());
    }
}
