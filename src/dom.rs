//! Owned element tree the extractor works on.
//!
//! Pages come in as HTML (parsed with `scraper`) and are lowered into a small
//! owned tree of [`Node`]s. Everything downstream (locating messages,
//! converting them to Markdown) only ever sees this tree, so tests can build
//! synthetic inputs without going through an HTML parser.

use crate::error::DiscoveryError;
use scraper::{ElementRef, Html};

/// Deepest element nesting the tree walks will follow.
pub const MAX_DEPTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element(Element),
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_class(self, class: impl Into<String>) -> Self {
        self.with_attr("class", class)
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Node::Text(text.into()))
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn class_list(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_list().any(|c| c == class)
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_elements(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First descendant element with the given tag, depth-first.
    pub fn find_descendant(&self, tag: &str) -> Option<&Element> {
        self.child_elements().find_map(|child| {
            if child.tag.eq_ignore_ascii_case(tag) {
                Some(child)
            } else {
                child.find_descendant(tag)
            }
        })
    }

    /// Drop every descendant element matching `pred`, together with its subtree.
    pub fn remove_descendants(&mut self, pred: &dyn Fn(&Element) -> bool) {
        self.children.retain(|child| match child {
            Node::Element(el) => !pred(el),
            Node::Text(_) => true,
        });
        for child in &mut self.children {
            if let Node::Element(el) = child {
                el.remove_descendants(pred);
            }
        }
    }

    /// Concatenated text of all descendant text nodes, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            collect_text(child, &mut out);
        }
        out
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Tag(tag) => self.tag.eq_ignore_ascii_case(tag),
            Selector::Class(class) => self.has_class(class),
            Selector::ClassContains(fragment) => self
                .attr("class")
                .is_some_and(|class| class.contains(*fragment)),
            Selector::AttrEquals(name, value) => self.attr(name) == Some(*value),
            Selector::AttrContains(name, fragment) => {
                self.attr(name).is_some_and(|v| v.contains(*fragment))
            }
        }
    }

    pub fn matches_any(&self, selectors: &[Selector]) -> bool {
        selectors.iter().any(|s| self.matches(s))
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Element(el) => {
            for child in &el.children {
                collect_text(child, out);
            }
        }
    }
}

/// The handful of CSS selector shapes the extractor needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// `tag`
    Tag(&'static str),
    /// `.class`
    Class(&'static str),
    /// `[class*="fragment"]`
    ClassContains(&'static str),
    /// `[name="value"]`
    AttrEquals(&'static str, &'static str),
    /// `[name*="fragment"]`
    AttrContains(&'static str, &'static str),
}

/// Every descendant of `root` matching any of `selectors`, in document order.
///
/// The selectors are evaluated in a single pass, so results for different
/// selectors stay interleaved the way they appear in the page.
pub fn select_all<'a>(
    root: &'a Element,
    selectors: &[Selector],
) -> Result<Vec<&'a Element>, DiscoveryError> {
    walk(root, selectors, false)
}

/// Like [`select_all`], but does not look inside an element that already matched.
pub fn select_outermost<'a>(
    root: &'a Element,
    selectors: &[Selector],
) -> Result<Vec<&'a Element>, DiscoveryError> {
    walk(root, selectors, true)
}

fn walk<'a>(
    root: &'a Element,
    selectors: &[Selector],
    stop_at_match: bool,
) -> Result<Vec<&'a Element>, DiscoveryError> {
    let mut found = Vec::new();
    // Children are pushed in reverse so they pop in document order.
    let mut stack: Vec<(&'a Element, usize)> =
        root.child_elements().rev().map(|el| (el, 1)).collect();

    while let Some((el, depth)) = stack.pop() {
        if depth > MAX_DEPTH {
            return Err(DiscoveryError::TooDeep { limit: MAX_DEPTH });
        }
        let matched = el.matches_any(selectors);
        if matched {
            found.push(el);
        }
        if !(matched && stop_at_match) {
            stack.extend(el.child_elements().rev().map(|c| (c, depth + 1)));
        }
    }
    Ok(found)
}

/// Phrasing elements: whitespace between two of them is a word separator.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "i", "img", "kbd",
    "label", "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u",
    "var",
];

fn is_inline(node: Option<&scraper::Node>) -> bool {
    matches!(node, Some(scraper::Node::Element(el)) if INLINE_TAGS.contains(&el.name()))
}

/// Parse an HTML document or fragment into an owned tree rooted at `<html>`.
pub fn parse_html(html: &str) -> Element {
    let document = Html::parse_document(html);
    let mut truncated = false;
    let root = lower(document.root_element(), 0, false, &mut truncated);
    if truncated {
        tracing::warn!(limit = MAX_DEPTH, "document nesting truncated while parsing");
    }
    root
}

fn lower(el: ElementRef<'_>, depth: usize, in_pre: bool, truncated: &mut bool) -> Element {
    let value = el.value();
    let mut out = Element::new(value.name());
    out.attrs = value
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if depth >= MAX_DEPTH {
        *truncated = true;
        return out;
    }

    let in_pre = in_pre || out.tag == "pre";
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                let text: &str = text;
                // Indentation around block elements is layout, not content.
                if in_pre || !text.contains('\n') || !text.trim().is_empty() {
                    out.children.push(Node::Text(text.to_string()));
                } else if is_inline(child.prev_sibling().map(|n| n.value()))
                    && is_inline(child.next_sibling().map(|n| n.value()))
                {
                    // A line break between two inline elements separates words.
                    out.children.push(Node::Text(" ".to_string()));
                }
            }
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    let lowered = lower(child_el, depth + 1, in_pre, truncated);
                    out.children.push(Node::Element(lowered));
                }
            }
            _ => {}
        }
    }
    out
}
