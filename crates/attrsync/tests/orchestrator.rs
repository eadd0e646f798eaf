use std::{sync::Arc, time::Duration};

use attrsync::{
    Error, FrameScheduler, HostBindings, HostEvent, HostOptions, Orchestrator, Phase, Settings,
    Watcher,
    dom::{ElementRef, NodeId, Observer, descendants},
    memory::{Document, MemoryWorkspace},
    test_support::{ANNOTATION_ATTR, FlakyObserver, RecordingRenderer},
};

struct Harness {
    doc: Document,
    workspace: Arc<MemoryWorkspace>,
    renderer: Arc<RecordingRenderer>,
    frames: FrameScheduler,
}

impl Harness {
    fn new() -> Self {
        let doc = Document::new();
        Self {
            workspace: Arc::new(MemoryWorkspace::new(doc.clone())),
            doc,
            renderer: RecordingRenderer::new(),
            frames: FrameScheduler::new(),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(Arc::new(self.doc.clone()), Settings::default())
    }

    fn orchestrator_with(&self, observer: Arc<dyn Observer>, settings: Settings) -> Orchestrator {
        let host = HostBindings {
            workspace: self.workspace.clone(),
            observer,
            renderer: self.renderer.clone(),
        };
        Orchestrator::new(host, self.frames.clone(), settings).unwrap()
    }

    fn attach(&self, parent: &ElementRef, tag: &str, class: &str) -> ElementRef {
        let el = self.doc.create_element(tag, class);
        self.doc.append_child(parent, &el);
        el
    }

    /// Deliver pending records and run frames until the queue drains.
    fn settle(&self) {
        self.doc.flush();
        self.frames.run_until_idle(100);
        self.doc.flush();
    }

    fn annotations(&self) -> Vec<(NodeId, Option<String>)> {
        descendants(self.doc.body().as_ref())
            .into_iter()
            .map(|el| (el.id(), el.attr(ANNOTATION_ATTR)))
            .collect()
    }

    fn annotated(&self) -> usize {
        self.annotations().iter().filter(|(_, a)| a.is_some()).count()
    }
}

fn ready(orch: &mut Orchestrator) {
    orch.activate().unwrap();
    orch.handle_event(HostEvent::LayoutReady);
}

#[test]
fn watch_count_matches_open_instances_of_active_rows() {
    let h = Harness::new();
    h.workspace.open_leaf("graph-analysis");
    h.workspace.open_leaf("graph-analysis");
    h.workspace.open_leaf("markdown");
    h.workspace.open_leaf("search");
    h.workspace.open_leaf("not-in-registry");

    let mut orch = h.orchestrator();
    assert_eq!(orch.phase(), Phase::Uninitialized);
    ready(&mut orch);

    assert_eq!(orch.phase(), Phase::Active);
    assert!(orch.is_layout_ready());
    // markdown/backlinks is conditional and the option is off.
    assert_eq!(orch.watch_count(), 4);
    assert_eq!(orch.watches().iter().filter(|w| w.is_dynamic()).count(), 2);
    assert_eq!(orch.overlay_count(), 1);
    assert_eq!(h.doc.observer_count(), 5);

    h.workspace.set_options(HostOptions {
        backlink_in_document: true,
        bookmarks_available: false,
    });
    assert_eq!(orch.rebuild_watchers().unwrap(), 5);
    assert_eq!(h.doc.observer_count(), 6);
    assert_eq!(orch.stats().rebuilds, 2);
}

#[test]
fn events_before_activation_are_ignored() {
    let h = Harness::new();
    h.workspace.open_leaf("graph-analysis");
    let mut orch = h.orchestrator();

    orch.handle_event(HostEvent::LayoutReady);
    orch.handle_event(HostEvent::IndexChanged);
    assert_eq!(orch.watch_count(), 0);
    assert_eq!(orch.stats().events, 0);
    assert_eq!(orch.rebuild_watchers().unwrap(), 0);
    orch.refresh_all().unwrap();
    assert_eq!(h.renderer.visible_refreshes(), 0);
}

#[test]
fn layout_ready_builds_once_and_refreshes() {
    let h = Harness::new();
    let graph = h.workspace.open_leaf("graph-analysis");
    let link = h.attach(&graph, "a", "internal-link");

    let mut orch = h.orchestrator();
    ready(&mut orch);
    orch.handle_event(HostEvent::LayoutReady);

    assert_eq!(orch.stats().rebuilds, 1);
    assert_eq!(orch.stats().refreshes, 1);
    assert_eq!(h.renderer.visible_refreshes(), 1);
    assert_eq!(
        h.renderer.view_types_of(link.id()),
        vec![Some("graph-analysis".to_string())]
    );
}

#[test]
fn refresh_all_is_idempotent() {
    let h = Harness::new();
    let graph = h.workspace.open_leaf("graph-analysis");
    for _ in 0..3 {
        h.attach(&graph, "a", "internal-link");
    }
    let explorer = h.workspace.open_leaf("file-explorer");
    let item = h.attach(&explorer, "div", "tree-item nav-file");
    h.attach(&item, "div", "nav-file-title-content");
    h.settle();

    let mut orch = h.orchestrator();
    ready(&mut orch);
    h.settle();
    let before = h.annotations();
    assert_eq!(h.annotated(), 4);

    orch.refresh_all().unwrap();
    h.settle();
    orch.refresh_all().unwrap();
    h.settle();

    assert_eq!(h.annotations(), before);
    assert_eq!(orch.stats().refreshes, 3);
}

#[test]
fn refresh_renders_each_view_type_selector_pair_once() {
    let h = Harness::new();
    let graph = h.workspace.open_leaf("graph-analysis");
    let link = h.attach(&graph, "a", "internal-link");
    h.workspace.open_leaf("graph-analysis");

    let mut orch = h.orchestrator();
    ready(&mut orch);
    h.renderer.reset();

    orch.refresh_all().unwrap();
    // Two watchers share the pair; each container is still visited once.
    assert_eq!(h.renderer.renders_of(link.id()), 1);
}

#[test]
fn insertion_burst_coalesces_into_one_rescan() {
    let h = Harness::new();
    let graph = h.workspace.open_leaf("graph-analysis");
    let mut orch = h.orchestrator();
    ready(&mut orch);
    h.doc.flush();

    let links: Vec<ElementRef> = (0..5)
        .map(|_| h.attach(&graph, "a", "internal-link"))
        .collect();
    h.doc.flush();
    h.doc.flush();
    assert_eq!(h.frames.pending(), 1);
    h.frames.tick();

    let handle = orch.watches().iter().next().unwrap();
    let Watcher::Full(watcher) = &handle.watcher else {
        panic!("graph-analysis is not a dynamic row");
    };
    assert_eq!(watcher.rescans(), 1);
    for link in &links {
        assert_eq!(h.renderer.renders_of(link.id()), 1);
    }
}

#[test]
fn pane_closed_before_the_frame_is_left_alone() {
    let h = Harness::new();
    let graph = h.workspace.open_leaf("graph-analysis");
    let mut orch = h.orchestrator();
    ready(&mut orch);
    h.doc.flush();

    let link = h.attach(&graph, "a", "internal-link");
    h.doc.flush();
    assert_eq!(h.frames.pending(), 1);
    h.workspace.close_leaf("graph-analysis", &graph);
    h.frames.run_until_idle(100);
    assert_eq!(h.renderer.renders_of(link.id()), 0);

    // Refreshes only visit open panes.
    orch.refresh_all().unwrap();
    assert_eq!(h.renderer.renders_of(link.id()), 0);
    assert_eq!(link.attr(ANNOTATION_ATTR), None);
    assert_eq!(orch.rebuild_watchers().unwrap(), 0);
}

#[test]
fn dynamic_container_only_works_on_inserted_targets() {
    let h = Harness::new();
    let search = h.workspace.open_leaf("search");
    let mut orch = h.orchestrator();
    ready(&mut orch);
    h.doc.flush();
    h.renderer.reset();

    // An item without the parent class produces no work.
    let stray = h.doc.create_element("div", "search-header");
    h.attach(&stray, "div", "tree-item-inner");
    h.doc.append_child(&search, &stray);
    h.doc.flush();
    assert!(h.frames.is_idle());

    let item = h.doc.create_element("div", "tree-item search-result");
    let inner = h.attach(&item, "div", "tree-item-inner");
    h.doc.append_child(&search, &item);
    h.doc.flush();
    assert_eq!(h.frames.pending(), 1);
    assert_eq!(h.renderer.render_count(), 0);

    h.frames.tick();
    assert_eq!(h.renderer.render_count(), 1);
    assert_eq!(
        h.renderer.view_types_of(inner.id()),
        vec![Some("search".to_string())]
    );
}

#[test]
fn canvas_children_are_never_annotated() {
    let h = Harness::new();
    let graph = h.workspace.open_leaf("graph-analysis");
    let canvas = h.attach(&graph, "div", "canvas-node");
    canvas.set_attr("data-path", "boards/plan.canvas");
    let skipped = h.attach(&canvas, "a", "internal-link");
    let kept = h.attach(&graph, "a", "internal-link");

    let mut orch = h.orchestrator();
    ready(&mut orch);

    assert_eq!(h.renderer.renders_of(skipped.id()), 0);
    assert_eq!(h.renderer.renders_of(kept.id()), 1);
}

#[test]
fn suggestion_overlay_gets_suggestion_selector() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    orch.activate().unwrap();
    h.doc.flush();

    let popup = h.doc.create_element("div", "suggestion-container modal-container");
    let title = h.attach(&popup, "div", "suggestion-title");
    let switcher = h.attach(&popup, "div", "another-quick-switcher__item__title");
    h.doc.append_child(&h.doc.body(), &popup);
    h.settle();

    let overlay = &orch.overlays()[0];
    assert!(overlay.is_watching(popup.id()));
    assert_eq!(
        overlay.selector_for(popup.id()).unwrap().to_string(),
        ".suggestion-title, .suggestion-note"
    );
    assert_eq!(h.renderer.view_types_of(title.id()), vec![None]);
    assert_eq!(h.renderer.renders_of(switcher.id()), 0);

    // Closing the overlay drops its watcher.
    h.doc.remove(&popup);
    h.doc.flush();
    assert_eq!(orch.overlays()[0].child_count(), 0);
}

#[test]
fn bookmarks_refresh_only_when_available() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    ready(&mut orch);
    let refreshes = orch.stats().refreshes;
    orch.handle_event(HostEvent::BookmarksChanged);
    assert_eq!(orch.stats().refreshes, refreshes);

    let h = Harness::new();
    h.workspace.set_options(HostOptions {
        backlink_in_document: false,
        bookmarks_available: true,
    });
    let mut orch = h.orchestrator();
    ready(&mut orch);
    let refreshes = orch.stats().refreshes;
    orch.handle_event(HostEvent::BookmarksChanged);
    assert_eq!(orch.stats().refreshes, refreshes + 1);
}

#[test]
fn window_open_installs_one_overlay_per_root() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    orch.activate().unwrap();

    let other = Document::new();
    orch.handle_event(HostEvent::WindowOpened(other.body()));
    orch.handle_event(HostEvent::WindowOpened(other.body()));
    orch.handle_event(HostEvent::WindowOpened(h.doc.body()));
    assert_eq!(orch.overlay_count(), 2);
    assert_eq!(h.doc.observer_count(), 2);
}

#[test]
fn content_rendered_is_forwarded_to_renderer() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    orch.activate().unwrap();
    let section = h.attach(&h.doc.body(), "div", "markdown-preview-section");
    orch.handle_event(HostEvent::ContentRendered(section.clone()));
    assert_eq!(h.renderer.post_processed(), vec![section.id()]);
}

#[test]
fn teardown_disconnects_everything_and_clears_annotations() {
    let h = Harness::new();
    let graph = h.workspace.open_leaf("graph-analysis");
    h.attach(&graph, "a", "internal-link");
    let search = h.workspace.open_leaf("search");
    let item = h.attach(&search, "div", "tree-item");
    h.attach(&item, "div", "tree-item-inner");

    let mut orch = h.orchestrator();
    ready(&mut orch);
    let popup = h.doc.create_element("div", "modal-container");
    h.attach(&popup, "div", "suggestion-note");
    h.doc.append_child(&h.doc.body(), &popup);
    h.settle();
    assert_eq!(h.annotated(), 3);

    let report = orch.teardown();
    assert_eq!(orch.phase(), Phase::TornDown);
    assert_eq!(report.watchers, 2);
    assert_eq!(report.overlays, 1);
    assert_eq!(report.cleared, 3);
    assert!(report.errors.is_empty());
    assert_eq!(h.doc.observer_count(), 0);
    assert_eq!(orch.watch_count(), 0);
    assert_eq!(h.annotated(), 0);

    // Terminal.
    assert!(orch.teardown().errors.is_empty());
    assert!(matches!(orch.refresh_all(), Err(Error::TornDown)));
    assert!(matches!(orch.reload(), Err(Error::TornDown)));
    assert!(matches!(orch.activate(), Err(Error::TornDown)));
    orch.handle_event(HostEvent::IndexChanged);
    assert_eq!(orch.stats().events, 1);
}

#[test]
fn teardown_continues_past_failed_disconnects() {
    let h = Harness::new();
    let graph = h.workspace.open_leaf("graph-analysis");
    h.attach(&graph, "a", "internal-link");
    h.workspace.open_leaf("graph-analysis");
    h.workspace.open_leaf("markdown");
    h.workspace.open_leaf("search");

    let flaky = Arc::new(FlakyObserver::new(Arc::new(h.doc.clone()), 2));
    let mut orch = h.orchestrator_with(flaky.clone(), Settings::default());
    ready(&mut orch);
    assert_eq!(h.doc.observer_count(), 5);
    assert_eq!(h.annotated(), 1);

    let report = orch.teardown();
    assert_eq!(report.errors.len(), 2);
    assert_eq!(flaky.failures(), 2);
    assert_eq!(report.watchers, 4);
    assert_eq!(orch.watch_count(), 0);
    assert_eq!(orch.overlay_count(), 0);
    assert_eq!(h.annotated(), 0);
    // Only the refused subscriptions remain on the host.
    assert_eq!(h.doc.observer_count(), 2);
}

#[test]
fn reload_rebuilds_watchers_and_overlays_for_every_window() {
    let h = Harness::new();
    let graph = h.workspace.open_leaf("graph-analysis");
    let link = h.attach(&graph, "a", "internal-link");
    let mut orch = h.orchestrator();
    ready(&mut orch);
    let other = Document::new();
    orch.handle_event(HostEvent::WindowOpened(other.body()));

    let report = orch.reload().unwrap();
    assert_eq!(report.watchers, 1);
    assert_eq!(report.overlays, 2);
    assert_eq!(orch.phase(), Phase::Active);
    assert_eq!(orch.watch_count(), 1);
    assert_eq!(orch.overlay_count(), 2);
    assert_eq!(h.doc.observer_count(), 3);
    // Cleared by the teardown half, painted again by the refresh.
    assert!(h.renderer.cleared(link.id()));
    assert_eq!(
        link.attr(ANNOTATION_ATTR).as_deref(),
        Some("graph-analysis")
    );
}

#[test]
fn extra_view_types_from_settings_are_watched() {
    let h = Harness::new();
    let custom = h.workspace.open_leaf("kanban");
    let card = h.attach(&custom, "span", "kanban-link");
    let settings = Settings::from_ron(
        r#"(view_types: [(view_type: "kanban", selector: "span.kanban-link")])"#,
    )
    .unwrap();

    let mut orch = h.orchestrator_with(Arc::new(h.doc.clone()), settings);
    ready(&mut orch);
    assert_eq!(orch.watch_count(), 1);
    assert_eq!(
        h.renderer.view_types_of(card.id()),
        vec![Some("kanban".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn notifications_are_debounced_per_event_type() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    ready(&mut orch);
    let base = orch.stats().refreshes;

    orch.handle_event(HostEvent::IndexChanged);
    orch.handle_event(HostEvent::IndexRebuilt);
    assert_eq!(orch.stats().refreshes, base + 2);

    tokio::time::advance(Duration::from_millis(100)).await;
    orch.handle_event(HostEvent::IndexChanged);
    tokio::time::advance(Duration::from_millis(100)).await;
    // 100ms after the previous call; the window restarted.
    orch.handle_event(HostEvent::IndexChanged);
    assert_eq!(orch.stats().refreshes, base + 2);
    assert_eq!(orch.stats().debounced, 2);

    tokio::time::advance(Duration::from_millis(151)).await;
    orch.handle_event(HostEvent::IndexChanged);
    assert_eq!(orch.stats().refreshes, base + 3);
}

#[tokio::test(start_paused = true)]
async fn layout_change_rebuilds_before_refreshing() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    ready(&mut orch);
    assert_eq!(orch.watch_count(), 0);

    let graph = h.workspace.open_leaf("graph-analysis");
    let link = h.attach(&graph, "a", "internal-link");
    orch.handle_event(HostEvent::LayoutChanged);

    assert_eq!(orch.watch_count(), 1);
    assert_eq!(h.renderer.renders_of(link.id()), 1);

    orch.handle_event(HostEvent::LayoutChanged);
    assert_eq!(orch.stats().rebuilds, 2);
    assert_eq!(orch.stats().debounced, 2);

    tokio::time::advance(Duration::from_millis(60)).await;
    orch.handle_event(HostEvent::LayoutChanged);
    assert_eq!(orch.stats().rebuilds, 3);
}
