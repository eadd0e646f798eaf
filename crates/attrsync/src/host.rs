//! Collaborators the engine consumes from its host application.

use crate::dom::ElementRef;

/// Host capabilities that change which registry rows and notifications apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostOptions {
    /// Backlinks are rendered inside document panes.
    pub backlink_in_document: bool,
    /// A bookmarks component is present and emits change notifications.
    pub bookmarks_available: bool,
}

/// Enumeration of open view instances.
pub trait Workspace: Send + Sync {
    /// Container elements of every open view instance of `view_type`.
    fn leaves_of_type(&self, view_type: &str) -> Vec<ElementRef>;
    /// Root element of the main window's document.
    fn document_root(&self) -> ElementRef;
    /// Current host capabilities.
    fn options(&self) -> HostOptions;
}

/// Paints and removes annotations on individual elements.
///
/// Failures are the renderer's own business; the engine only promises to call
/// it with elements that are still attached.
pub trait Renderer: Send + Sync {
    /// Paint or update the annotation on `el`.
    fn render_into(&self, el: &ElementRef, view_type: Option<&str>, hint: &str);
    /// Remove a previously painted annotation from `el`.
    fn clear(&self, el: &ElementRef);
    /// Best-effort global pass over everything currently visible.
    fn refresh_visible(&self);
    /// Annotate links inside freshly rendered document content.
    fn render_links_in(&self, el: &ElementRef);
}

/// Notifications delivered by the host.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// The host layout is ready; fires once.
    LayoutReady,
    /// Panes were opened, closed or rearranged.
    LayoutChanged,
    /// The metadata index changed.
    IndexChanged,
    /// The metadata index finished a full rebuild.
    IndexRebuilt,
    /// Bookmarks changed.
    BookmarksChanged,
    /// A new window opened; carries the root of its document.
    WindowOpened(ElementRef),
    /// Document content was freshly rendered into this element.
    ContentRendered(ElementRef),
}

impl HostEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LayoutReady => "layout-ready",
            Self::LayoutChanged => "layout-change",
            Self::IndexChanged => "index-changed",
            Self::IndexRebuilt => "index-rebuilt",
            Self::BookmarksChanged => "bookmarks-changed",
            Self::WindowOpened(_) => "window-open",
            Self::ContentRendered(_) => "content-rendered",
        }
    }
}
