//! Static table of view types whose rendered links get annotated.
//!
//! Each row maps a view-type tag to the selector of its target elements and
//! says whether targets appear incrementally. Adding a view type means adding
//! a row; watcher logic never special-cases a tag. A tag may appear in more
//! than one row, distinguished by `variant`.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    host::HostOptions,
    selector::Selector,
};

/// Default class of a dynamic row's target element.
pub const DEFAULT_OWN_CLASS: &str = "tree-item-inner";
/// Default class of the item that wraps a dynamic row's target element.
pub const DEFAULT_PARENT_CLASS: &str = "tree-item";

/// When a row applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowCondition {
    /// Always.
    #[default]
    Always,
    /// Only when backlinks are rendered inside document panes.
    BacklinkInDocument,
}

impl RowCondition {
    /// Whether the row applies under `options`.
    pub fn holds(self, options: &HostOptions) -> bool {
        match self {
            Self::Always => true,
            Self::BacklinkInDocument => options.backlink_in_document,
        }
    }
}

/// Serde default for [`ViewTypeRow::own_class`].
fn default_own_class() -> String {
    DEFAULT_OWN_CLASS.to_string()
}

/// Serde default for [`ViewTypeRow::parent_class`].
fn default_parent_class() -> String {
    DEFAULT_PARENT_CLASS.to_string()
}

/// Serializable form of a registry row, used for rows added through settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewTypeRow {
    /// View-type tag of the host view.
    pub view_type: String,
    /// Distinguishes rows sharing a tag; empty for the only row.
    #[serde(default)]
    pub variant: String,
    /// Selector list of target elements.
    pub selector: String,
    /// Watch inserted items instead of rescanning.
    #[serde(default)]
    pub dynamic: bool,
    /// Class of a target element inside an inserted item.
    #[serde(default = "default_own_class")]
    pub own_class: String,
    /// Class of an inserted item worth inspecting.
    #[serde(default = "default_parent_class")]
    pub parent_class: String,
    /// When the row applies.
    #[serde(default)]
    pub condition: RowCondition,
}

/// Compile-time row used by the built-in table.
#[derive(Debug, Clone, Copy)]
struct RowSpec {
    /// See [`ViewTypeRow::view_type`].
    view_type: &'static str,
    /// See [`ViewTypeRow::variant`].
    variant: &'static str,
    /// See [`ViewTypeRow::selector`].
    selector: &'static str,
    /// See [`ViewTypeRow::dynamic`].
    dynamic: bool,
    /// See [`ViewTypeRow::own_class`].
    own_class: &'static str,
    /// See [`ViewTypeRow::parent_class`].
    parent_class: &'static str,
    /// See [`ViewTypeRow::condition`].
    condition: RowCondition,
}

/// A full-rescan row with default classes that always applies.
const fn row(view_type: &'static str, selector: &'static str) -> RowSpec {
    RowSpec {
        view_type,
        variant: "",
        selector,
        dynamic: false,
        own_class: DEFAULT_OWN_CLASS,
        parent_class: DEFAULT_PARENT_CLASS,
        condition: RowCondition::Always,
    }
}

impl RowSpec {
    /// Mark the row dynamic.
    const fn dynamic(self) -> Self {
        Self {
            dynamic: true,
            ..self
        }
    }

    /// Set the variant.
    const fn variant(self, variant: &'static str) -> Self {
        Self { variant, ..self }
    }

    /// Override the item and target classes.
    const fn classes(self, own_class: &'static str, parent_class: &'static str) -> Self {
        Self {
            own_class,
            parent_class,
            ..self
        }
    }

    /// Restrict the row to `condition`.
    const fn when(self, condition: RowCondition) -> Self {
        Self { condition, ..self }
    }

    /// Owned serializable form.
    fn to_row(self) -> ViewTypeRow {
        ViewTypeRow {
            view_type: self.view_type.to_string(),
            variant: self.variant.to_string(),
            selector: self.selector.to_string(),
            dynamic: self.dynamic,
            own_class: self.own_class.to_string(),
            parent_class: self.parent_class.to_string(),
            condition: self.condition,
        }
    }
}

/// Rows known without any configuration.
const BUILTIN_ROWS: &[RowSpec] = &[
    row("backlink", ".tree-item-inner").dynamic(),
    row("bases", ".internal-link")
        .dynamic()
        .variant("table")
        .classes("internal-link", "bases-tr"),
    row("bases", ".internal-link")
        .dynamic()
        .variant("cards")
        .classes("internal-link", "bases-cards-item"),
    row("BC-ducks", ".internal-link"),
    row("BC-matrix", ".BC-Link"),
    row("BC-tree", "a.internal-link"),
    row("file-explorer", ".nav-file-title-content").dynamic(),
    row("graph-analysis", ".internal-link"),
    row("markdown", ".internal-link").dynamic(),
    row("markdown", ".tree-item-inner")
        .dynamic()
        .variant("backlinks")
        .when(RowCondition::BacklinkInDocument),
    row("outgoing-link", ".tree-item-inner").dynamic(),
    row("recent-files", ".nav-file-title-content").dynamic(),
    row("search", ".tree-item-inner").dynamic(),
    row("starred", ".nav-file-title-content").dynamic(),
];

/// Identity of a registry row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    /// View-type tag.
    pub view_type: String,
    /// Row variant; empty for the only row of a tag.
    pub variant: String,
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant.is_empty() {
            f.write_str(&self.view_type)
        } else {
            write!(f, "{}/{}", self.view_type, self.variant)
        }
    }
}

/// A parsed registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTypeDescriptor {
    /// Row identity.
    pub key: RowKey,
    /// Target elements inside a view instance's container.
    pub selector: Selector,
    /// Targets appear incrementally; watch inserted items instead of rescanning.
    pub dynamic: bool,
    /// Class of a target element inside an inserted item.
    pub own_class: String,
    /// Class of an inserted item worth inspecting.
    pub parent_class: String,
    /// When the row applies.
    pub condition: RowCondition,
}

impl ViewTypeDescriptor {
    /// Parse a serializable row.
    fn from_row(row: &ViewTypeRow) -> Result<Self> {
        Ok(Self {
            key: RowKey {
                view_type: row.view_type.clone(),
                variant: row.variant.clone(),
            },
            selector: Selector::parse(&row.selector)?,
            dynamic: row.dynamic,
            own_class: row.own_class.clone(),
            parent_class: row.parent_class.clone(),
            condition: row.condition,
        })
    }

    /// View-type tag of the row.
    pub fn view_type(&self) -> &str {
        &self.key.view_type
    }
}

/// Lookup table of view-type rows.
#[derive(Debug, Clone)]
pub struct SelectorRegistry {
    /// Rows in table order.
    rows: Vec<ViewTypeDescriptor>,
}

impl SelectorRegistry {
    /// Build a registry from rows, parsing selectors and rejecting duplicate
    /// (view type, variant) keys.
    pub fn from_rows<'a, I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a ViewTypeRow>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in rows {
            let desc = ViewTypeDescriptor::from_row(row)?;
            if !seen.insert(desc.key.clone()) {
                return Err(Error::Config(format!("duplicate view type row {}", desc.key)));
            }
            out.push(desc);
        }
        Ok(Self { rows: out })
    }

    /// The built-in table.
    pub fn builtin() -> Result<Self> {
        Self::with_extra(&[])
    }

    /// The built-in table followed by `extra` rows.
    pub fn with_extra(extra: &[ViewTypeRow]) -> Result<Self> {
        let builtin: Vec<ViewTypeRow> = BUILTIN_ROWS.iter().map(|r| r.to_row()).collect();
        Self::from_rows(builtin.iter().chain(extra))
    }

    /// First row for `view_type`, or `None` for an unknown tag.
    pub fn lookup(&self, view_type: &str) -> Option<&ViewTypeDescriptor> {
        self.rows.iter().find(|r| r.key.view_type == view_type)
    }

    /// Row with an exact key.
    pub fn get(&self, key: &RowKey) -> Option<&ViewTypeDescriptor> {
        self.rows.iter().find(|r| &r.key == key)
    }

    /// Every row for `view_type`.
    pub fn variants<'a>(
        &'a self,
        view_type: &'a str,
    ) -> impl Iterator<Item = &'a ViewTypeDescriptor> + 'a {
        self.rows.iter().filter(move |r| r.key.view_type == view_type)
    }

    /// Rows whose condition holds under `options`.
    pub fn active_rows<'a>(
        &'a self,
        options: &'a HostOptions,
    ) -> impl Iterator<Item = &'a ViewTypeDescriptor> + 'a {
        self.rows.iter().filter(move |r| r.condition.holds(options))
    }

    /// Every row in table order.
    pub fn rows(&self) -> &[ViewTypeDescriptor] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_parses() {
        let reg = SelectorRegistry::builtin().unwrap();
        assert_eq!(reg.len(), BUILTIN_ROWS.len());
        let md = reg.lookup("markdown").unwrap();
        assert!(md.dynamic);
        assert_eq!(md.selector.to_string(), ".internal-link");
        assert!(reg.lookup("kanban").is_none());
    }

    #[test]
    fn shared_tags_are_distinct_rows() {
        let reg = SelectorRegistry::builtin().unwrap();
        let bases: Vec<_> = reg.variants("bases").collect();
        assert_eq!(bases.len(), 2);
        assert_eq!(bases[0].parent_class, "bases-tr");
        assert_eq!(bases[1].parent_class, "bases-cards-item");
        assert!(bases.iter().all(|r| r.own_class == "internal-link"));
    }

    #[test]
    fn conditional_rows_follow_host_options() {
        let reg = SelectorRegistry::builtin().unwrap();
        let off = HostOptions::default();
        let on = HostOptions {
            backlink_in_document: true,
            ..HostOptions::default()
        };
        let count = |o: &HostOptions| {
            reg.active_rows(o)
                .filter(|r| r.view_type() == "markdown")
                .count()
        };
        assert_eq!(count(&off), 1);
        assert_eq!(count(&on), 2);
    }

    #[test]
    fn extra_rows_append_and_duplicates_are_rejected() {
        let extra = ViewTypeRow {
            view_type: "kanban".into(),
            variant: String::new(),
            selector: ".kanban-plugin__item-title a".into(),
            dynamic: false,
            own_class: default_own_class(),
            parent_class: default_parent_class(),
            condition: RowCondition::Always,
        };
        // Combinators are not supported.
        assert!(matches!(
            SelectorRegistry::with_extra(std::slice::from_ref(&extra)),
            Err(Error::Selector { .. })
        ));

        let ok = ViewTypeRow {
            selector: "a.internal-link".into(),
            ..extra
        };
        let reg = SelectorRegistry::with_extra(std::slice::from_ref(&ok)).unwrap();
        assert!(reg.lookup("kanban").is_some());

        let dup = ViewTypeRow {
            view_type: "search".into(),
            ..ok
        };
        assert!(matches!(
            SelectorRegistry::with_extra(&[dup]),
            Err(Error::Config(_))
        ));
    }
}
