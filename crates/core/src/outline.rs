//! Report outline cleaning and expansion
//!
//! A report outline is a user-authored heading tree of arbitrary depth. It
//! arrives in one of two shapes:
//!
//! - plain: `[{ "title": "...", "subtitles": [ ... ] }]`
//! - sectioned: `[{ "title": "...", "data": [{ "title": "...", "subtitles": [ ... ] }] }]`
//!
//! Before rendering, the tree is cleaned ([`clean`] / [`clean_sections`]) and
//! then flattened into a [`HeadingEntry`] plan ([`expand`]) that the document
//! layer applies in one batch.
//!
//! # Empty children
//!
//! In the plain shape a node whose children were all removed survives as a
//! leaf topic. In the sectioned shape a section left with no entries is
//! dropped. The choice is carried explicitly by [`EmptyChildren`].

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Instructional text the front-end leaves in fields the user has not filled.
pub const PLACEHOLDER_SENTINEL: &str = "Clique ou toque aqui para inserir o texto.";

/// Closing-section titles, in priority order. The signature block follows
/// the first one found among the top-level headings.
pub const CLOSING_SECTIONS: &[&str] = &["proposta de encaminhamentos", "conclusão"];

/// One heading in the outline tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub title: String,
    #[serde(default)]
    pub subtitles: Vec<OutlineNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl OutlineNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitles: Vec::new(),
            slug: None,
        }
    }

    pub fn with_children(title: impl Into<String>, subtitles: Vec<OutlineNode>) -> Self {
        Self {
            title: title.into(),
            subtitles,
            slug: None,
        }
    }
}

/// A section of the sectioned outline shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub title: String,
    #[serde(default)]
    pub data: Vec<OutlineNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl OutlineSection {
    /// View the section as a heading whose children are its entries.
    pub fn into_node(self) -> OutlineNode {
        OutlineNode {
            title: self.title,
            subtitles: self.data,
            slug: self.slug,
        }
    }
}

/// What happens to a section whose entries were all removed by cleaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyChildren {
    /// Keep it as a leaf.
    #[default]
    Keep,
    /// Drop it.
    Drop,
}

/// Cleaning options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOptions {
    /// Nodes whose title contains this text are removed.
    pub sentinel: String,
    /// Applied to sectioned outlines by [`clean_sections`].
    pub empty_children: EmptyChildren,
    /// Attach a slug to every kept node.
    pub slugs: bool,
}

impl CleanOptions {
    /// Plain outlines: childless nodes survive, no slugs.
    pub fn plain() -> Self {
        Self {
            sentinel: PLACEHOLDER_SENTINEL.to_string(),
            empty_children: EmptyChildren::Keep,
            slugs: false,
        }
    }

    /// Sectioned outlines: empty sections are dropped, every node gets a slug.
    pub fn sectioned() -> Self {
        Self {
            sentinel: PLACEHOLDER_SENTINEL.to_string(),
            empty_children: EmptyChildren::Drop,
            slugs: true,
        }
    }

    fn rejects(&self, title: &str) -> bool {
        title.is_empty() || (!self.sentinel.is_empty() && title.contains(&self.sentinel))
    }
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self::plain()
    }
}

/// Remove placeholder and blank nodes at every depth.
///
/// Children are cleaned before their parent is judged. Titles are trimmed.
/// The result is a fixed point: cleaning it again changes nothing.
pub fn clean(nodes: &[OutlineNode], options: &CleanOptions) -> Vec<OutlineNode> {
    nodes
        .iter()
        .filter_map(|node| clean_node(node, options))
        .collect()
}

fn clean_node(node: &OutlineNode, options: &CleanOptions) -> Option<OutlineNode> {
    let subtitles = clean(&node.subtitles, options);
    let title = node.title.trim();
    if options.rejects(title) {
        return None;
    }

    Some(OutlineNode {
        title: title.to_string(),
        subtitles,
        slug: options.slugs.then(|| slugify(title)),
    })
}

/// Clean a sectioned outline; sections are judged after their entries.
pub fn clean_sections(sections: &[OutlineSection], options: &CleanOptions) -> Vec<OutlineSection> {
    sections
        .iter()
        .filter_map(|section| {
            let data = clean(&section.data, options);
            let title = section.title.trim();
            if options.rejects(title) {
                return None;
            }
            if data.is_empty() && options.empty_children == EmptyChildren::Drop {
                return None;
            }
            Some(OutlineSection {
                title: title.to_string(),
                data,
                slug: options.slugs.then(|| slugify(title)),
            })
        })
        .collect()
}

/// Machine-readable identifier for a title.
///
/// Accents are stripped, letters lower-cased and every run of other
/// characters collapses into a single `_`: `"Análise de Preços"` →
/// `"analise_de_precos"`.
pub fn slugify(title: &str) -> String {
    title
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// One heading of the flattened plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingEntry {
    /// 1-based heading level.
    pub level: usize,
    pub title: String,
    pub page_break_before: bool,
}

/// Flatten a cleaned tree into document order.
///
/// Parents precede their children, and a subtree is complete before the
/// next sibling starts. Every level-1 heading is preceded by a page break;
/// deeper levels never are.
pub fn expand(nodes: &[OutlineNode]) -> Vec<HeadingEntry> {
    let mut plan = Vec::new();
    expand_into(nodes, 1, &mut plan);
    plan
}

fn expand_into(nodes: &[OutlineNode], level: usize, plan: &mut Vec<HeadingEntry>) {
    for node in nodes {
        plan.push(HeadingEntry {
            level,
            title: node.title.clone(),
            page_break_before: level == 1,
        });
        expand_into(&node.subtitles, level + 1, plan);
    }
}

/// Index in `plan` of the heading the signature block follows.
///
/// Only level-1 headings are considered. Titles are compared
/// case-insensitively against [`CLOSING_SECTIONS`]; the first name in that
/// list that matches any heading wins.
pub fn find_closing_section(plan: &[HeadingEntry]) -> Option<usize> {
    CLOSING_SECTIONS.iter().find_map(|name| {
        plan.iter()
            .position(|entry| entry.level == 1 && entry.title.trim().to_lowercase() == *name)
    })
}
