//! Lifecycle owner for every watcher of one engine instance.
//!
//! The orchestrator moves through `Uninitialized -> Active -> TornDown`.
//! Activation installs an overlay watcher on the main document; the host's
//! layout-ready signal builds the registry-driven view watchers and runs a
//! full refresh. Host notifications are debounced independently, each on its
//! own leading-edge window. Teardown disconnects everything and clears
//! annotations painted inside watched containers; it is terminal.

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, trace};

use crate::{
    annotate::Annotator,
    config::Settings,
    debounce::Debouncer,
    dom::{ElementRef, Observer},
    error::{Error, Result},
    frame::FrameScheduler,
    host::{HostEvent, Renderer, Workspace},
    overlay::{OverlayClassifier, OverlayWatcher},
    registry::SelectorRegistry,
    selector::Selector,
    watcher::{ContainerWatcher, DynamicContainerWatcher, WatchContext},
    watchlist::{WatchList, Watcher},
};

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created; host events are ignored.
    Uninitialized,
    /// Watching and reacting to host events.
    Active,
    /// Terminal; build a fresh orchestrator to start over.
    TornDown,
}

/// Host collaborators handed to an orchestrator.
#[derive(Clone)]
pub struct HostBindings {
    /// Open view instances and host options.
    pub workspace: Arc<dyn Workspace>,
    /// Mutation subscriptions.
    pub observer: Arc<dyn Observer>,
    /// Annotation painting.
    pub renderer: Arc<dyn Renderer>,
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Host events handled while active.
    pub events: u64,
    /// Global refreshes run.
    pub refreshes: u64,
    /// Watcher sets built.
    pub rebuilds: u64,
    /// Notifications swallowed by a debounce window.
    pub debounced: u64,
}

/// What a teardown pass did.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// View watchers disconnected.
    pub watchers: usize,
    /// Overlay watchers torn down.
    pub overlays: usize,
    /// Elements whose annotation was cleared.
    pub cleared: usize,
    /// Disconnect failures; every other watcher was still torn down.
    pub errors: Vec<Error>,
}

/// One debouncer per notification kind.
struct Debounces {
    /// Index changed.
    index_changed: Debouncer,
    /// Index rebuilt.
    index_rebuilt: Debouncer,
    /// Layout change, refresh side.
    layout_refresh: Debouncer,
    /// Layout change, rebuild side.
    layout_rebuild: Debouncer,
    /// Bookmarks changed.
    bookmarks: Debouncer,
}

impl Debounces {
    /// Windows taken from `settings`.
    fn from_settings(settings: &Settings) -> Self {
        let d = &settings.debounce;
        Self {
            index_changed: Debouncer::new(d.index_changed()),
            index_rebuilt: Debouncer::new(d.index_rebuilt()),
            layout_refresh: Debouncer::new(d.layout_refresh()),
            layout_rebuild: Debouncer::new(d.layout_rebuild()),
            bookmarks: Debouncer::new(d.bookmarks()),
        }
    }
}

/// Owns the watch list and overlay watchers and reacts to host events.
pub struct Orchestrator {
    /// Lifecycle phase.
    phase: Phase,
    /// Host workspace.
    workspace: Arc<dyn Workspace>,
    /// Host renderer, for refresh and post-processing calls.
    renderer: Arc<dyn Renderer>,
    /// Shared by every watcher this orchestrator creates.
    ctx: WatchContext,
    /// Validated settings.
    settings: Settings,
    /// View-type rows.
    registry: SelectorRegistry,
    /// Overlay recognition.
    classifier: OverlayClassifier,
    /// View watchers.
    watches: WatchList,
    /// One overlay watcher per window root.
    overlays: Vec<OverlayWatcher>,
    /// Every window root seen, so reload can reinstall their overlay watchers.
    window_roots: Vec<ElementRef>,
    /// The host reported its layout as ready.
    layout_ready: bool,
    /// Bookmark notifications are honored.
    bookmarks_subscribed: bool,
    /// Notification debouncers.
    debounce: Debounces,
    /// Counters.
    stats: Stats,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase)
            .field("watches", &self.watches.len())
            .field("overlays", &self.overlays.len())
            .field("layout_ready", &self.layout_ready)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an uninitialized orchestrator.
    pub fn new(host: HostBindings, frames: FrameScheduler, settings: Settings) -> Result<Self> {
        settings.validate()?;
        let registry = settings.registry()?;
        let classifier = OverlayClassifier::from_settings(&settings.overlay)?;
        let annotator = Annotator::new(host.renderer.clone(), settings.non_target.clone());
        Ok(Self {
            phase: Phase::Uninitialized,
            workspace: host.workspace,
            renderer: host.renderer,
            ctx: WatchContext {
                observer: host.observer,
                frames,
                annotator,
            },
            debounce: Debounces::from_settings(&settings),
            settings,
            registry,
            classifier,
            watches: WatchList::new(),
            overlays: Vec::new(),
            window_roots: Vec::new(),
            layout_ready: false,
            bookmarks_subscribed: false,
            stats: Stats::default(),
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Frame clock driving every watcher.
    pub fn frames(&self) -> &FrameScheduler {
        &self.ctx.frames
    }

    /// Settings in effect.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// View-type rows in effect.
    pub fn registry(&self) -> &SelectorRegistry {
        &self.registry
    }

    /// Active view watchers.
    pub fn watches(&self) -> &WatchList {
        &self.watches
    }

    /// Number of active view watchers.
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Overlay watchers, one per window root.
    pub fn overlays(&self) -> &[OverlayWatcher] {
        &self.overlays
    }

    /// Number of overlay watchers.
    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    /// Whether layout-ready has been received.
    pub fn is_layout_ready(&self) -> bool {
        self.layout_ready
    }

    /// Counters so far.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Enter the active phase and start watching the main document for
    /// overlays. Calling it again while active is a no-op.
    pub fn activate(&mut self) -> Result<()> {
        match self.phase {
            Phase::TornDown => Err(Error::TornDown),
            Phase::Active => Ok(()),
            Phase::Uninitialized => {
                self.phase = Phase::Active;
                self.bookmarks_subscribed = self.workspace.options().bookmarks_available;
                let root = self.workspace.document_root();
                self.install_overlay(root);
                debug!(
                    bookmarks = self.bookmarks_subscribed,
                    rows = self.registry.len(),
                    "orchestrator_active"
                );
                Ok(())
            }
        }
    }

    /// Dispatch one host notification. Ignored unless active.
    pub fn handle_event(&mut self, event: HostEvent) {
        if self.phase != Phase::Active {
            trace!(event = event.name(), phase = ?self.phase, "event_ignored");
            return;
        }
        self.stats.events += 1;
        match event {
            HostEvent::LayoutReady => self.on_layout_ready(),
            HostEvent::LayoutChanged => {
                // Rebuild first so a refresh in the same burst sees new panes.
                if self.layout_ready && self.fire(|d| &mut d.layout_rebuild) {
                    self.build_watchers();
                }
                if self.fire(|d| &mut d.layout_refresh) {
                    self.refresh();
                }
            }
            HostEvent::IndexChanged => {
                if self.fire(|d| &mut d.index_changed) {
                    self.refresh();
                }
            }
            HostEvent::IndexRebuilt => {
                if self.fire(|d| &mut d.index_rebuilt) {
                    self.refresh();
                }
            }
            HostEvent::BookmarksChanged => {
                if self.bookmarks_subscribed && self.fire(|d| &mut d.bookmarks) {
                    self.refresh();
                }
            }
            HostEvent::WindowOpened(root) => self.install_overlay(root),
            HostEvent::ContentRendered(el) => self.renderer.render_links_in(&el),
        }
    }

    /// Run one debouncer; counts swallowed calls.
    fn fire(&mut self, pick: impl FnOnce(&mut Debounces) -> &mut Debouncer) -> bool {
        let fired = pick(&mut self.debounce).call();
        if !fired {
            self.stats.debounced += 1;
        }
        fired
    }

    /// Build watchers and refresh once, on the first layout-ready.
    fn on_layout_ready(&mut self) {
        if self.layout_ready {
            trace!("layout_ready_repeat");
            return;
        }
        self.layout_ready = true;
        self.build_watchers();
        self.refresh();
    }

    /// Force a global refresh.
    pub fn refresh_all(&mut self) -> Result<()> {
        match self.phase {
            Phase::TornDown => Err(Error::TornDown),
            Phase::Uninitialized => Ok(()),
            Phase::Active => {
                self.refresh();
                Ok(())
            }
        }
    }

    /// Rescan every watched (container, selector) pair once.
    fn refresh(&mut self) {
        self.stats.refreshes += 1;
        self.renderer.refresh_visible();
        if self.watches.is_empty() {
            trace!("refresh_visible_only");
            return;
        }

        let mut seen = HashSet::new();
        let targets: Vec<(String, Selector)> = self
            .watches
            .iter()
            .filter(|h| seen.insert((h.view_type().to_string(), h.selector.to_string())))
            .map(|h| (h.view_type().to_string(), h.selector.clone()))
            .collect();

        let mut rendered = 0;
        for (view_type, selector) in &targets {
            for container in self.workspace.leaves_of_type(view_type) {
                rendered += self.ctx.annotator.update_container(
                    &container,
                    selector,
                    Some(view_type.as_str()),
                );
            }
        }
        debug!(pairs = targets.len(), rendered, "refresh");
    }

    /// Drop every view watcher and derive a fresh set from the registry and
    /// the currently open view instances. Returns the number of watchers.
    pub fn rebuild_watchers(&mut self) -> Result<usize> {
        match self.phase {
            Phase::TornDown => Err(Error::TornDown),
            Phase::Uninitialized => Ok(0),
            Phase::Active => Ok(self.build_watchers()),
        }
    }

    /// Replace the watcher set.
    fn build_watchers(&mut self) -> usize {
        for e in self.watches.disconnect_all() {
            debug!(error = %e, "rebuild_disconnect_failed");
        }
        let options = self.workspace.options();
        for desc in self.registry.active_rows(&options) {
            for container in self.workspace.leaves_of_type(desc.view_type()) {
                let ctx = &self.ctx;
                let chunk = self.settings.chunks.dynamic;
                self.watches.insert(
                    desc.key.clone(),
                    desc.selector.clone(),
                    container,
                    |container: &ElementRef| {
                        if desc.dynamic {
                            Watcher::Dynamic(DynamicContainerWatcher::watch(
                                ctx,
                                container.clone(),
                                desc,
                                chunk,
                            ))
                        } else {
                            Watcher::Full(ContainerWatcher::watch(
                                ctx,
                                container.clone(),
                                desc.selector.clone(),
                                Some(desc.view_type().to_string()),
                            ))
                        }
                    },
                );
            }
        }
        self.stats.rebuilds += 1;
        debug!(watchers = self.watches.len(), "watchers_built");
        self.watches.len()
    }

    /// Watch `root` for overlays unless already watched.
    fn install_overlay(&mut self, root: ElementRef) {
        if self.overlays.iter().any(|o| o.root().id() == root.id()) {
            trace!(root = %root.id(), "overlay_already_installed");
            return;
        }
        if !self.window_roots.iter().any(|r| r.id() == root.id()) {
            self.window_roots.push(root.clone());
        }
        debug!(root = %root.id(), "overlay_install");
        self.overlays.push(OverlayWatcher::watch(
            &self.ctx,
            root,
            self.classifier.clone(),
            self.settings.chunks.overlay,
        ));
    }

    /// Tear down view and overlay watchers, collecting errors.
    fn disconnect_everything(&mut self) -> TeardownReport {
        let mut report = TeardownReport {
            watchers: self.watches.len(),
            overlays: self.overlays.len(),
            ..TeardownReport::default()
        };
        let (cleared, errors) = self.watches.teardown(&self.ctx.annotator);
        report.cleared += cleared;
        report.errors.extend(errors);
        for mut overlay in self.overlays.drain(..) {
            let (cleared, errors) = overlay.teardown(&self.ctx.annotator);
            report.cleared += cleared;
            report.errors.extend(errors);
        }
        report
    }

    /// Disconnect every watcher and clear annotations inside watched
    /// containers. Terminal; a second call does nothing.
    pub fn teardown(&mut self) -> TeardownReport {
        if self.phase == Phase::TornDown {
            return TeardownReport::default();
        }
        let report = self.disconnect_everything();
        self.phase = Phase::TornDown;
        debug!(
            watchers = report.watchers,
            overlays = report.overlays,
            cleared = report.cleared,
            errors = report.errors.len(),
            "orchestrator_torn_down"
        );
        report
    }

    /// Full teardown of watchers followed by re-activation, for settings
    /// changes. Overlay watchers are reinstalled for every known window.
    pub fn reload(&mut self) -> Result<TeardownReport> {
        match self.phase {
            Phase::TornDown => return Err(Error::TornDown),
            Phase::Uninitialized => {
                self.activate()?;
                return Ok(TeardownReport::default());
            }
            Phase::Active => {}
        }
        let report = self.disconnect_everything();
        for root in self.window_roots.clone() {
            self.install_overlay(root);
        }
        if self.layout_ready {
            self.build_watchers();
        }
        self.refresh();
        debug!(cleared = report.cleared, "orchestrator_reloaded");
        Ok(report)
    }
}
