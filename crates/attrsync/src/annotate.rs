//! Container-level annotation passes on top of the [`Renderer`] collaborator.

use std::sync::Arc;

use tracing::trace;

use crate::{
    config::NonTargetRule,
    dom::{Element, ElementRef, find_all},
    host::Renderer,
    selector::Selector,
};

/// Runs render and clear passes over a container's target elements.
#[derive(Clone)]
pub struct Annotator {
    /// Writes and clears annotations.
    renderer: Arc<dyn Renderer>,
    /// Excludes elements under matching parents.
    non_target: NonTargetRule,
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("non_target", &self.non_target)
            .finish_non_exhaustive()
    }
}

impl Annotator {
    /// Create an annotator over `renderer` that skips elements excluded by
    /// `non_target`.
    pub fn new(renderer: Arc<dyn Renderer>, non_target: NonTargetRule) -> Self {
        Self {
            renderer,
            non_target,
        }
    }

    /// The renderer collaborator.
    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// Whether `el` may receive an annotation.
    pub fn is_target(&self, el: &dyn Element) -> bool {
        let excluded = el.parent().is_some_and(|p| {
            p.attr(&self.non_target.attribute)
                .is_some_and(|v| v.contains(&self.non_target.fragment))
        });
        !excluded
    }

    /// Target elements of `container` under `selector`.
    pub fn targets(&self, container: &dyn Element, selector: &Selector) -> Vec<ElementRef> {
        find_all(container, selector)
            .into_iter()
            .filter(|el| self.is_target(el.as_ref()))
            .collect()
    }

    /// Render every target inside `container`. Returns the number rendered.
    /// A container no longer attached to the document renders nothing.
    pub fn update_container(
        &self,
        container: &ElementRef,
        selector: &Selector,
        view_type: Option<&str>,
    ) -> usize {
        if !container.is_connected() {
            trace!(container = %container.id(), "update_container_detached");
            return 0;
        }
        let targets = self.targets(container.as_ref(), selector);
        if targets.is_empty() {
            return 0;
        }
        for el in &targets {
            self.renderer.render_into(el, view_type, "");
        }
        trace!(
            container = %container.id(),
            view_type = view_type.unwrap_or("-"),
            rendered = targets.len(),
            "update_container"
        );
        targets.len()
    }

    /// Render a single element if it is still attached and a valid target.
    pub fn update_element(&self, el: &ElementRef, view_type: Option<&str>) -> bool {
        if !el.is_connected() || !self.is_target(el.as_ref()) {
            return false;
        }
        self.renderer.render_into(el, view_type, "");
        true
    }

    /// Clear annotations from every element of `container` matching
    /// `selector`. Returns the number cleared.
    pub fn clear_container(&self, container: &ElementRef, selector: &Selector) -> usize {
        let nodes = find_all(container.as_ref(), selector);
        for el in &nodes {
            self.renderer.clear(el);
        }
        nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory::Document, test_support::RecordingRenderer};

    #[test]
    fn detached_container_renders_nothing() {
        let doc = Document::new();
        let renderer = RecordingRenderer::new();
        let annotator = Annotator::new(renderer.clone(), NonTargetRule::default());
        let selector = Selector::parse(".internal-link").unwrap();
        let container = doc.create_element("div", "view-content");
        doc.append_child(&doc.body(), &container);
        let link = doc.create_element("a", "internal-link");
        doc.append_child(&container, &link);

        assert_eq!(annotator.update_container(&container, &selector, None), 1);
        doc.remove(&container);
        assert_eq!(annotator.update_container(&container, &selector, None), 0);
        assert_eq!(renderer.renders_of(link.id()), 1);
        assert!(!annotator.update_element(&link, None));
    }

    #[test]
    fn canvas_parents_exclude_their_children() {
        let doc = Document::new();
        let renderer = RecordingRenderer::new();
        let annotator = Annotator::new(renderer, NonTargetRule::default());
        let selector = Selector::parse(".tree-item-inner").unwrap();
        let item = doc.create_element("div", "tree-item");
        item.set_attr("data-path", "boards/plan.canvas");
        let inner = doc.create_element("div", "tree-item-inner");
        doc.append_child(&item, &inner);
        doc.append_child(&doc.body(), &item);

        assert!(!annotator.is_target(inner.as_ref()));
        assert!(annotator.targets(doc.body().as_ref(), &selector).is_empty());
    }
}
