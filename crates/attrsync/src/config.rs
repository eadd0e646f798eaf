//! Engine settings, loadable from RON.
//!
//! Every field has a default, so an empty file (or `()`) is a valid config:
//!
//! ```ron
//! (
//!     chunks: (overlay: 10, dynamic: 20),
//!     debounce: (layout_refresh_ms: 50),
//!     view_types: [
//!         (view_type: "kanban", selector: "a.internal-link"),
//!     ],
//! )
//! ```

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    registry::{SelectorRegistry, ViewTypeRow},
    selector::Selector,
};

/// Items drained per frame, per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkSettings {
    /// Overlay updates.
    pub overlay: usize,
    /// Dynamic list updates.
    pub dynamic: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            overlay: 10,
            dynamic: 20,
        }
    }
}

/// Debounce windows for host notifications, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebounceSettings {
    /// Metadata index reported a changed file.
    pub index_changed_ms: u64,
    /// Metadata index finished a rebuild.
    pub index_rebuilt_ms: u64,
    /// Layout change triggering a global refresh.
    pub layout_refresh_ms: u64,
    /// Layout change triggering a watcher rebuild.
    pub layout_rebuild_ms: u64,
    /// Bookmarks changed.
    pub bookmarks_ms: u64,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            index_changed_ms: 150,
            index_rebuilt_ms: 150,
            layout_refresh_ms: 50,
            layout_rebuild_ms: 50,
            bookmarks_ms: 150,
        }
    }
}

impl DebounceSettings {
    /// Window for index changes.
    pub fn index_changed(&self) -> Duration {
        Duration::from_millis(self.index_changed_ms)
    }

    /// Window for index rebuilds.
    pub fn index_rebuilt(&self) -> Duration {
        Duration::from_millis(self.index_rebuilt_ms)
    }

    /// Window for layout-driven refreshes.
    pub fn layout_refresh(&self) -> Duration {
        Duration::from_millis(self.layout_refresh_ms)
    }

    /// Window for layout-driven watcher rebuilds.
    pub fn layout_rebuild(&self) -> Duration {
        Duration::from_millis(self.layout_rebuild_ms)
    }

    /// Window for bookmark changes.
    pub fn bookmarks(&self) -> Duration {
        Duration::from_millis(self.bookmarks_ms)
    }
}

/// How overlay containers are recognized and what is annotated inside them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlaySettings {
    /// Class-name substring marking a modal dialog.
    pub modal_marker: String,
    /// Class-name substring marking a suggestion popup.
    pub suggestion_marker: String,
    /// Selector list of targets inside modals.
    pub modal_selector: String,
    /// Selector list of targets inside suggestion popups.
    pub suggestion_selector: String,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            modal_marker: "modal-container".to_string(),
            suggestion_marker: "suggestion-container".to_string(),
            modal_selector: ".suggestion-title, .suggestion-note, \
                             .another-quick-switcher__item__title, .omnisearch-result__title"
                .to_string(),
            suggestion_selector: ".suggestion-title, .suggestion-note".to_string(),
        }
    }
}

/// Elements whose parent's `attribute` contains `fragment` are never targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NonTargetRule {
    /// Parent attribute to inspect.
    pub attribute: String,
    /// Substring that marks the parent as excluded.
    pub fragment: String,
}

impl Default for NonTargetRule {
    fn default() -> Self {
        Self {
            attribute: "data-path".to_string(),
            fragment: ".canvas".to_string(),
        }
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Per-frame drain sizes.
    pub chunks: ChunkSettings,
    /// Notification debounce windows.
    pub debounce: DebounceSettings,
    /// Overlay recognition.
    pub overlay: OverlaySettings,
    /// Elements never annotated.
    pub non_target: NonTargetRule,
    /// Rows appended to the built-in view-type table.
    pub view_types: Vec<ViewTypeRow>,
}

impl Settings {
    /// Parse and validate RON text.
    pub fn from_ron(text: &str) -> Result<Self> {
        let settings: Self = ron::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a RON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Render as pretty RON.
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunks.overlay == 0 || self.chunks.dynamic == 0 {
            return Err(Error::Config("chunk sizes must be at least 1".to_string()));
        }
        if self.overlay.modal_marker.is_empty() || self.overlay.suggestion_marker.is_empty() {
            return Err(Error::Config("overlay markers must not be empty".to_string()));
        }
        if self.non_target.attribute.is_empty() {
            return Err(Error::Config(
                "non-target attribute must not be empty".to_string(),
            ));
        }
        Selector::parse(&self.overlay.modal_selector)?;
        Selector::parse(&self.overlay.suggestion_selector)?;
        SelectorRegistry::with_extra(&self.view_types)?;
        Ok(())
    }

    /// The registry these settings describe.
    pub fn registry(&self) -> Result<SelectorRegistry> {
        SelectorRegistry::with_extra(&self.view_types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_all_defaults() {
        let s = Settings::from_ron("()").unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.chunks.overlay, 10);
        assert_eq!(s.chunks.dynamic, 20);
        assert_eq!(s.debounce.layout_refresh(), Duration::from_millis(50));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let s = Settings::from_ron(
            r#"(
                chunks: (dynamic: 5),
                view_types: [(view_type: "kanban", selector: "a.internal-link", dynamic: true)],
            )"#,
        )
        .unwrap();
        assert_eq!(s.chunks.dynamic, 5);
        assert_eq!(s.chunks.overlay, 10);
        assert_eq!(s.view_types[0].own_class, "tree-item-inner");
        assert!(s.registry().unwrap().lookup("kanban").is_some());
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(matches!(
            Settings::from_ron("(chunks: (overlay: 0))"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Settings::from_ron(r#"(overlay: (suggestion_selector: "div > a"))"#),
            Err(Error::Selector { .. })
        ));
        assert!(matches!(
            Settings::from_ron("(unknown: 1)"),
            Err(Error::Ron(_))
        ));
    }

    #[test]
    fn round_trips_through_ron() {
        let s = Settings::default();
        let text = s.to_ron().unwrap();
        assert_eq!(Settings::from_ron(&text).unwrap(), s);
    }
}
