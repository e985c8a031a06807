//! Heading-aware HTML record extraction.
//!
//! Walks a rendered HTML document in document order and emits one
//! [`ExtractedNode`] per element matching the configured CSS selector
//! (paragraphs by default). While walking, an explicit stack of open
//! headings is maintained so that every emitted node knows the section it
//! belongs to:
//!
//! ```text
//! <h1>Guide</h1>            stack = [Guide, -, -, ...]
//! <h2>Install</h2>          stack = [Guide, Install, -, ...]
//! <p>Run cargo</p>          → hierarchy {lvl0: Guide, lvl1: Install}
//! <h2>Usage</h2>            stack = [Guide, Usage, -, ...]
//! ```
//!
//! A heading at level N replaces slot N and clears every deeper slot. The
//! stack lives inside a single [`HierarchyExtractor::extract`] call, so
//! documents can be extracted in parallel.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::models::{Hierarchy, Weight, HIERARCHY_DEPTH};

/// Selector used when no `nodes_to_index` is configured.
pub const DEFAULT_NODES_TO_INDEX: &str = "p";

/// Subtrees that never contain indexable content.
const SKIPPED_TAGS: &[&str] = &["script", "style", "template", "noscript"];

/// Heading weight of a node that is not under any heading.
const BASE_HEADING_WEIGHT: i64 = 100;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// A content node selected for indexing, with its section context.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedNode {
    pub tag_name: String,
    /// Inner HTML of the node.
    pub html: String,
    /// Whitespace-collapsed text content.
    pub text: String,
    /// Identifier of the nearest preceding heading, if it carries one.
    pub anchor: Option<String>,
    pub hierarchy: Hierarchy,
    pub weight: Weight,
}

/// Extracts indexable nodes from rendered HTML.
pub struct HierarchyExtractor {
    nodes: Selector,
    anchors: Selector,
}

impl HierarchyExtractor {
    /// Build an extractor for the given CSS selector.
    pub fn new(nodes_to_index: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            nodes: parse_selector(nodes_to_index)?,
            anchors: parse_selector("a[id], a[name]")?,
        })
    }

    /// Extract every matching node of `html`, in document order.
    ///
    /// A document without matching nodes yields an empty vector.
    pub fn extract(&self, html: &str) -> Vec<ExtractedNode> {
        let document = Html::parse_document(html);
        let mut walk = Walk::default();

        for node in document.root_element().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            if is_skipped(&element) {
                continue;
            }

            if let Some(level) = heading_level(element.value().name()) {
                let text = collapse_whitespace(&element_text(&element));
                walk.open_heading(level, text, self.heading_anchor(&element));
            }

            if !self.nodes.matches(&element) || self.is_inside_match(&element) {
                continue;
            }
            let text = collapse_whitespace(&element_text(&element));
            if text.is_empty() {
                continue;
            }
            walk.emit(&element, text);
        }

        walk.nodes
    }

    /// Nested matches are covered by their matching ancestor's record.
    fn is_inside_match(&self, element: &ElementRef<'_>) -> bool {
        element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| self.nodes.matches(&ancestor))
    }

    fn heading_anchor(&self, heading: &ElementRef<'_>) -> Option<String> {
        if let Some(id) = heading.value().id() {
            return Some(id.to_string());
        }
        heading.select(&self.anchors).next().and_then(|a| {
            a.value()
                .id()
                .or_else(|| a.value().attr("name"))
                .map(str::to_string)
        })
    }
}

/// Per-document traversal state.
#[derive(Default)]
struct Walk {
    headings: [Option<String>; HIERARCHY_DEPTH],
    anchor: Option<String>,
    nodes: Vec<ExtractedNode>,
}

impl Walk {
    fn open_heading(&mut self, level: usize, text: String, anchor: Option<String>) {
        self.headings[level] = Some(text);
        for slot in self.headings.iter_mut().skip(level + 1) {
            *slot = None;
        }
        self.anchor = anchor;
    }

    fn emit(&mut self, element: &ElementRef<'_>, text: String) {
        let position = self.nodes.len();
        self.nodes.push(ExtractedNode {
            tag_name: element.value().name().to_string(),
            html: element.inner_html().trim().to_string(),
            text,
            anchor: self.anchor.clone(),
            hierarchy: Hierarchy::from_levels(&self.headings),
            weight: Weight {
                heading: self.heading_weight(),
                position,
            },
        });
    }

    fn heading_weight(&self) -> i64 {
        match self.headings.iter().rposition(Option::is_some) {
            Some(level) => BASE_HEADING_WEIGHT - (level as i64 + 1) * 10,
            None => BASE_HEADING_WEIGHT,
        }
    }
}

fn is_skipped(element: &ElementRef<'_>) -> bool {
    SKIPPED_TAGS.contains(&element.value().name())
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| SKIPPED_TAGS.contains(&ancestor.value().name()))
}

fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// `h1` → 0 … `h6` → 5.
fn heading_level(tag: &str) -> Option<usize> {
    match tag {
        "h1" => Some(0),
        "h2" => Some(1),
        "h3" => Some(2),
        "h4" => Some(3),
        "h5" => Some(4),
        "h6" => Some(5),
        _ => None,
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().concat()
}

/// Collapse runs of whitespace into single spaces and trim the result.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Vec<ExtractedNode> {
        HierarchyExtractor::new(DEFAULT_NODES_TO_INDEX)
            .unwrap()
            .extract(html)
    }

    #[test]
    fn tracks_heading_hierarchy() {
        let nodes = extract(
            r#"
            <h1>Guide</h1>
            <p>Intro</p>
            <h2 id="install">Install</h2>
            <p>Run <code>cargo install</code>.</p>
            <h3>From source</h3>
            <p>Clone it.</p>
            <h2 id="usage">Usage</h2>
            <p>Call it.</p>
            "#,
        );

        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].hierarchy.lvl0.as_deref(), Some("Guide"));
        assert_eq!(nodes[0].hierarchy.lvl1, None);

        assert_eq!(nodes[1].hierarchy.lvl1.as_deref(), Some("Install"));
        assert_eq!(nodes[1].anchor.as_deref(), Some("install"));
        assert_eq!(nodes[1].html, "Run <code>cargo install</code>.");
        assert_eq!(nodes[1].text, "Run cargo install.");

        assert_eq!(nodes[2].hierarchy.lvl2.as_deref(), Some("From source"));
        assert_eq!(nodes[2].anchor, None);

        // A new h2 clears the h3 recorded under the previous h2.
        assert_eq!(nodes[3].hierarchy.lvl1.as_deref(), Some("Usage"));
        assert_eq!(nodes[3].hierarchy.lvl2, None);
        assert_eq!(nodes[3].anchor.as_deref(), Some("usage"));
    }

    #[test]
    fn positions_and_heading_weights() {
        let nodes = extract("<p>a</p><h1>T</h1><p>b</p><h3>S</h3><p>c</p>");
        let positions: Vec<usize> = nodes.iter().map(|n| n.weight.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(nodes[0].weight.heading, 100);
        assert_eq!(nodes[1].weight.heading, 90);
        assert_eq!(nodes[2].weight.heading, 70);
    }

    #[test]
    fn empty_document_yields_no_nodes() {
        assert!(extract("<html><body><h1>Only a title</h1></body></html>").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn headings_emitted_only_when_selected() {
        let extractor = HierarchyExtractor::new("h2, p").unwrap();
        let nodes = extractor.extract("<h1>A</h1><h2>B</h2><p>c</p>");
        let tags: Vec<&str> = nodes.iter().map(|n| n.tag_name.as_str()).collect();
        assert_eq!(tags, vec!["h2", "p"]);
        assert_eq!(nodes[0].hierarchy.lvl1.as_deref(), Some("B"));
    }

    #[test]
    fn nested_matches_are_not_emitted_twice() {
        let extractor = HierarchyExtractor::new("li, p").unwrap();
        let nodes = extractor.extract("<ul><li><p>inner</p></li></ul><p>outer</p>");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].tag_name, "li");
        assert_eq!(nodes[1].text, "outer");
    }

    #[test]
    fn skips_script_and_blank_nodes() {
        let nodes = extract("<p>   </p><template><p>hidden</p></template><p>shown</p>");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text, "shown");
        assert_eq!(nodes[0].weight.position, 0);
    }

    #[test]
    fn anchor_from_nested_link() {
        let nodes = extract(r#"<h2><a name="setup"></a>Setup</h2><p>x</p>"#);
        assert_eq!(nodes[0].anchor.as_deref(), Some("setup"));
        assert_eq!(nodes[0].hierarchy.lvl1.as_deref(), Some("Setup"));
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let err = HierarchyExtractor::new("p[").err().unwrap();
        assert!(matches!(err, ExtractError::InvalidSelector { .. }));
    }

    #[test]
    fn extraction_is_repeatable() {
        let html = "<h1>A</h1><p>one</p><p>two</p>";
        assert_eq!(extract(html), extract(html));
    }
}
