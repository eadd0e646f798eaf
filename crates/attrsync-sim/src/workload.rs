//! Scripted workload run against the in-memory host.

use std::{fmt, sync::Arc, time::Duration};

use attrsync::{
    Command, Driver, FrameScheduler, HostBindings, HostEvent, Orchestrator, Settings, Stats,
    dom::{ElementRef, descendants},
    memory::{Document, MemoryWorkspace},
    test_support::{ANNOTATION_ATTR, RecordingRenderer},
};
use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cli::Cli,
    error::{Error, Result},
};

/// Shape of one simulated session.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Panes per simulated view type.
    pub panes: usize,
    /// Insertion rounds per pane.
    pub rounds: usize,
    /// Items per pane per round.
    pub batch: usize,
    /// Entries in the suggestion popup.
    pub suggestions: usize,
    /// Frame period.
    pub frame: Duration,
}

impl From<&Cli> for Scenario {
    fn from(cli: &Cli) -> Self {
        Self {
            panes: cli.panes,
            rounds: cli.rounds,
            batch: cli.batch,
            suggestions: cli.suggestions,
            frame: Duration::from_millis(cli.frame_ms.max(1)),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    /// Target elements inserted.
    pub items: usize,
    /// Targets carrying an annotation just before teardown.
    pub annotated: usize,
    /// Annotations left after teardown.
    pub remaining: usize,
    /// Renderer `render_into` calls.
    pub renders: usize,
    /// Renderer `clear` calls.
    pub clears: usize,
    /// View watchers torn down.
    pub watchers: usize,
    /// Overlay watchers torn down.
    pub overlays: usize,
    /// Disconnect failures during teardown.
    pub errors: usize,
    /// Engine counters at teardown.
    pub stats: Stats,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "items:      {}", self.items)?;
        writeln!(f, "annotated:  {}", self.annotated)?;
        writeln!(f, "remaining:  {}", self.remaining)?;
        writeln!(f, "renders:    {}", self.renders)?;
        writeln!(f, "clears:     {}", self.clears)?;
        writeln!(f, "watchers:   {}", self.watchers)?;
        writeln!(f, "overlays:   {}", self.overlays)?;
        writeln!(f, "refreshes:  {}", self.stats.refreshes)?;
        writeln!(f, "rebuilds:   {}", self.stats.rebuilds)?;
        writeln!(f, "debounced:  {}", self.stats.debounced)?;
        write!(f, "errors:     {}", self.errors)
    }
}

/// Insert one search result item into `pane`.
fn add_search_result(doc: &Document, pane: &ElementRef) {
    let item = doc.create_element("div", "tree-item search-result");
    let inner = doc.create_element("div", "tree-item-inner");
    doc.append_child(&item, &inner);
    doc.append_child(pane, &item);
}

/// Insert one internal link into `pane`.
fn add_link(doc: &Document, pane: &ElementRef) {
    let link = doc.create_element("a", "internal-link");
    doc.append_child(pane, &link);
}

/// Elements in the document carrying an annotation.
fn count_annotated(doc: &Document) -> usize {
    descendants(doc.body().as_ref())
        .iter()
        .filter(|el| el.attr(ANNOTATION_ATTR).is_some())
        .count()
}

/// Sleep for `n` frames.
async fn frames(frame: Duration, n: usize) {
    time::sleep(frame * n as u32).await;
}

/// Run `scenario` on a fresh in-memory host and tear it down.
pub async fn run(settings: Settings, scenario: &Scenario) -> Result<Summary> {
    let chunk = settings.chunks.dynamic.min(settings.chunks.overlay).max(1);
    let doc = Document::new();
    let workspace = Arc::new(MemoryWorkspace::new(doc.clone()));
    let renderer = RecordingRenderer::new();
    let host = HostBindings {
        workspace: workspace.clone(),
        observer: Arc::new(doc.clone()),
        renderer: renderer.clone(),
    };
    let orchestrator = Orchestrator::new(host, FrameScheduler::new(), settings)?;

    let hook_doc = doc.clone();
    let driver = Driver::new(orchestrator)
        .with_frame_interval(scenario.frame)
        .with_frame_hook(Box::new(move || {
            hook_doc.flush();
        }));
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(driver.run(rx, cancel.clone()));
    let send = |cmd: Command| tx.send(cmd).map_err(|_| Error::DriverGone);

    let search: Vec<ElementRef> = (0..scenario.panes)
        .map(|_| workspace.open_leaf("search"))
        .collect();
    let graphs: Vec<ElementRef> = (0..scenario.panes)
        .map(|_| workspace.open_leaf("graph-analysis"))
        .collect();
    send(Command::Host(HostEvent::LayoutReady))?;

    let mut items = 0;
    for round in 0..scenario.rounds {
        for pane in &search {
            for _ in 0..scenario.batch {
                add_search_result(&doc, pane);
            }
        }
        for pane in &graphs {
            for _ in 0..scenario.batch {
                add_link(&doc, pane);
            }
        }
        items += 2 * scenario.panes * scenario.batch;
        if round % 2 == 0 {
            send(Command::Host(HostEvent::IndexChanged))?;
        }
        if round == 0 {
            send(Command::Reload)?;
        }
        debug!(round, items, "workload_round");
        frames(scenario.frame, 2 + scenario.batch / chunk).await;
    }

    let popup = doc.create_element("div", "suggestion-container");
    for _ in 0..scenario.suggestions {
        let title = doc.create_element("div", "suggestion-title");
        doc.append_child(&popup, &title);
    }
    doc.append_child(&doc.body(), &popup);
    items += scenario.suggestions;

    let late = workspace.open_leaf("graph-analysis");
    for _ in 0..scenario.batch {
        add_link(&doc, &late);
    }
    items += scenario.batch;
    send(Command::Host(HostEvent::LayoutChanged))?;

    frames(scenario.frame, 8 + items / chunk).await;
    let annotated = count_annotated(&doc);

    cancel.cancel();
    let (orchestrator, report) = task.await?;
    let summary = Summary {
        items,
        annotated,
        remaining: count_annotated(&doc),
        renders: renderer.render_count(),
        clears: renderer.clear_count(),
        watchers: report.watchers,
        overlays: report.overlays,
        errors: report.errors.len(),
        stats: orchestrator.stats(),
    };
    info!(
        items = summary.items,
        annotated = summary.annotated,
        renders = summary.renders,
        errors = summary.errors,
        "workload_done"
    );
    Ok(summary)
}
