//! A small CSS-like selector language for locating target elements.
//!
//! Supported grammar is a comma separated list of compound selectors, each an
//! optional tag name (or `*`) followed by any number of `.class` parts:
//!
//! ```text
//! .tree-item-inner
//! a.internal-link
//! .suggestion-title, .suggestion-note
//! ```
//!
//! Combinators, attribute selectors and pseudo classes are rejected.

use std::fmt;

use crate::{
    dom::{Element, has_class},
    error::{Error, Result},
};

/// One compound selector: `tag.class1.class2`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Compound {
    /// Lowercased tag name; `None` matches any tag.
    tag: Option<String>,
    /// Classes that must all be present.
    classes: Vec<String>,
}

impl Compound {
    /// Whether `el` has the tag and every class.
    fn matches(&self, el: &dyn Element) -> bool {
        if let Some(tag) = &self.tag
            && !el.tag_name().eq_ignore_ascii_case(tag)
        {
            return false;
        }
        self.classes.iter().all(|c| has_class(el, c))
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            f.write_str(tag)?;
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        Ok(())
    }
}

/// A parsed selector list. An element matches if any compound matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Alternatives, at least one.
    compounds: Vec<Compound>,
}

impl Selector {
    /// Parse selector text.
    pub fn parse(text: &str) -> Result<Self> {
        let err = |message: &str| Error::Selector {
            selector: text.to_string(),
            message: message.to_string(),
        };

        let mut compounds = Vec::new();
        for part in text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(err("empty selector in list"));
            }
            if part.contains(char::is_whitespace) {
                return Err(err("combinators are not supported"));
            }
            compounds.push(parse_compound(part).map_err(|m| err(&m))?);
        }
        Ok(Self { compounds })
    }

    /// Whether `el` matches any compound in this selector list.
    pub fn matches(&self, el: &dyn Element) -> bool {
        self.compounds.iter().any(|c| c.matches(el))
    }

    /// Number of compounds in the list.
    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    /// Always false for a successfully parsed selector.
    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.compounds.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Characters allowed in tag and class identifiers.
fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

/// Parse one `tag.class` compound.
fn parse_compound(part: &str) -> std::result::Result<Compound, String> {
    let mut segments = part.split('.');
    // split always yields at least one segment
    let head = segments.next().unwrap_or_default();
    let tag = match head {
        "" | "*" => None,
        t if t.chars().all(is_ident_char) && t.starts_with(|c: char| c.is_ascii_alphabetic()) => {
            Some(t.to_ascii_lowercase())
        }
        t => return Err(format!("unsupported tag name {t:?}")),
    };

    let mut classes = Vec::new();
    for class in segments {
        if class.is_empty() {
            return Err("empty class name".to_string());
        }
        if !class.chars().all(is_ident_char) {
            return Err(format!("unsupported class name {class:?}"));
        }
        classes.push(class.to_string());
    }

    if tag.is_none() && classes.is_empty() && head != "*" {
        return Err("selector has neither tag nor class".to_string());
    }
    Ok(Compound { tag, classes })
}
