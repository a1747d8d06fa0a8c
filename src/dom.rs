//! In-memory document model used by the capture pipeline.
//!
//! Documents are parsed with `scraper` and flattened into an arena of nodes
//! addressed by `NodeId`. The arena form makes duplication and node
//! replacement cheap and keeps every node reference a plain index, so cloned
//! documents can be handed across await points without borrowing the source.

use crate::color::{Color, TRANSPARENT};
use crate::{Error, Result};
use scraper::selector::{NonTSPseudoClass, PseudoElement, Simple};
use scraper::{ElementRef, Html};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::matching::{self, MatchingContext, MatchingMode, QuirksMode};
use selectors::parser::SelectorImpl;
use selectors::OpaqueElement;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use scraper::Selector;

/// Index of a node inside its owning `Document`
pub type NodeId = usize;

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element { tag: String, attrs: Vec<(String, String)> },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// The window a document is attached to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub width: u32,
    pub height: u32,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub device_pixel_ratio: f32,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            scroll_x: 0.0,
            scroll_y: 0.0,
            device_pixel_ratio: 1.0,
        }
    }
}

/// An arena-backed document tree.
///
/// A document without a window is valid (it can still be queried and cloned)
/// but cannot be captured.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: Option<NodeId>,
    window: Option<Window>,
    url: Option<String>,
}

impl Document {
    /// An empty `<html><head></head><body></body></html>` document
    pub fn new() -> Self {
        let mut doc = Document::default();
        let html = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.append_child(html, head);
        doc.append_child(html, body);
        doc.root = Some(html);
        doc
    }

    /// Parse an HTML string into a document (not yet attached to a window)
    pub fn parse_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut doc = Document::default();
        let root = doc.import_scraper(parsed.root_element(), None);
        doc.root = Some(root);
        doc
    }

    fn import_scraper(&mut self, element: ElementRef<'_>, parent: Option<NodeId>) -> NodeId {
        let attrs = element
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let id = self.push(NodeKind::Element { tag: element.value().name().to_ascii_lowercase(), attrs }, parent);
        for child in element.children() {
            if let Some(child_el) = ElementRef::wrap(child) {
                let cid = self.import_scraper(child_el, Some(id));
                self.nodes[id].children.push(cid);
            } else if let Some(text) = child.value().as_text() {
                let text: &str = text;
                if !text.trim().is_empty() {
                    let cid = self.push(NodeKind::Text(text.to_string()), Some(id));
                    self.nodes[id].children.push(cid);
                }
            }
        }
        id
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(NodeData { kind, parent, children: Vec::new() });
        self.nodes.len() - 1
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    /// Make `root` the document element
    pub fn with_root(mut self, root: NodeId) -> Self {
        self.root = Some(root);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn set_window(&mut self, window: Option<Window>) {
        self.window = window;
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Base URL the document was loaded from, if any
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id)
    }

    /// The `<html>` element
    pub fn document_element(&self) -> Option<NodeId> {
        self.root
    }

    pub fn body(&self) -> Option<NodeId> {
        let root = self.root?;
        self.child_elements(root).find(|&c| self.tag_name(c) == Some("body"))
    }

    pub fn element(&self, id: NodeId) -> Option<Element<'_>> {
        match self.nodes.get(id)?.kind {
            NodeKind::Element { .. } => Some(Element { document: self, id }),
            NodeKind::Text(_) => None,
        }
    }

    /// Create a detached element; attach it with `append_child`.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element { tag: tag.to_ascii_lowercase(), attrs: Vec::new() }, None)
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()), None)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Remove a node from its parent. The node stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    /// Put `new` where `old` is and detach `old`.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        let parent = self.nodes[old]
            .parent
            .ok_or_else(|| Error::Other(format!("node {} has no parent to replace it in", old)))?;
        self.detach(new);
        let pos = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == old)
            .unwrap_or(self.nodes[parent].children.len());
        self.nodes[parent].children.insert(pos, new);
        self.nodes[new].parent = Some(parent);
        self.nodes[parent].children.retain(|&c| c != old);
        self.nodes[old].parent = None;
        Ok(())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            match attrs.iter_mut().find(|(k, _)| k == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    /// A node is connected when its ancestor chain reaches the document element
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if Some(n) == self.root {
                return true;
            }
            cur = self.nodes.get(n).and_then(|d| d.parent);
        }
        false
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element { attrs, .. } => attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| matches!(self.nodes[c].kind, NodeKind::Element { .. }))
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Element { .. } => {
                for &c in &self.nodes[id].children {
                    self.collect_text(c, out);
                }
            }
        }
    }

    /// Look up a declaration in the element's inline `style` attribute
    pub fn style_property(&self, id: NodeId, property: &str) -> Option<String> {
        let style = self.attr(id, "style")?;
        style
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .filter(|(k, _)| k.trim().eq_ignore_ascii_case(property))
            .map(|(_, v)| v.trim().trim_end_matches("!important").trim().to_string())
            .last()
    }

    /// Resolved background color of an element.
    ///
    /// Reads `background-color`, then the first color token of `background`,
    /// then the legacy `bgcolor` attribute. Anything unparseable is transparent.
    pub fn computed_background(&self, id: NodeId) -> Color {
        if let Some(v) = self.style_property(id, "background-color") {
            return Color::parse(&v).unwrap_or(TRANSPARENT);
        }
        if let Some(v) = self.style_property(id, "background") {
            if let Ok(c) = Color::parse(&v) {
                return c;
            }
            if let Some(c) = v.split_whitespace().find_map(|tok| Color::parse(tok).ok()) {
                return c;
            }
        }
        self.attr(id, "bgcolor")
            .and_then(|v| Color::parse(v).ok())
            .unwrap_or(TRANSPARENT)
    }

    /// Parse a CSS selector group
    pub fn parse_selector(text: &str) -> Result<Selector> {
        Selector::parse(text).map_err(|e| Error::Config(format!("invalid selector \"{}\": {:?}", text, e)))
    }

    /// First connected element matching `selector`, in document order
    pub fn select_first(&self, selector: &Selector) -> Option<NodeId> {
        let root = self.root?;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if self.element(id).is_some_and(|el| el.matches(selector)) {
                return Some(id);
            }
            for &c in self.children(id).iter().rev() {
                stack.push(c);
            }
        }
        None
    }

    /// Like `query_selector`, but a selector that does not parse is an error
    pub fn try_query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        Ok(self.select_first(&Self::parse_selector(selector)?))
    }

    /// First connected element matching `selector`. Invalid selectors match nothing.
    pub fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.try_query_selector(selector).ok().flatten()
    }

    /// Copy the subtree rooted at `src_id` in `src` into this document as a
    /// detached subtree. Nodes for which `keep` returns false are skipped
    /// along with their descendants. Returns the id of the copied root and,
    /// if `target` was copied, its id in this document.
    pub fn import_subtree(
        &mut self,
        src: &Document,
        src_id: NodeId,
        target: Option<NodeId>,
        keep: &dyn Fn(&Document, NodeId) -> bool,
    ) -> (Option<NodeId>, Option<NodeId>) {
        let mut found = None;
        let copied = self.copy_node(src, src_id, target, keep, &mut found);
        (copied, found)
    }

    fn copy_node(
        &mut self,
        src: &Document,
        src_id: NodeId,
        target: Option<NodeId>,
        keep: &dyn Fn(&Document, NodeId) -> bool,
        found: &mut Option<NodeId>,
    ) -> Option<NodeId> {
        if !keep(src, src_id) {
            return None;
        }
        let node = src.nodes.get(src_id)?;
        let id = self.push(node.kind.clone(), None);
        if Some(src_id) == target {
            *found = Some(id);
        }
        for &c in &node.children {
            if let Some(cid) = self.copy_node(src, c, target, keep, found) {
                self.nodes[cid].parent = Some(id);
                self.nodes[id].children.push(cid);
            }
        }
        Some(id)
    }

    /// Serialize a subtree as XHTML
    pub fn serialize(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out, true);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String, is_root: bool) {
        match &self.nodes[id].kind {
            NodeKind::Text(t) => out.push_str(&escape(t)),
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                if is_root && !attrs.iter().any(|(k, _)| k == "xmlns") {
                    out.push_str(&format!(" xmlns=\"{}\"", XHTML_NS));
                }
                for (k, v) in attrs {
                    out.push_str(&format!(" {}=\"{}\"", k, escape(v)));
                }
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &c in &self.nodes[id].children {
                    self.write_node(c, out, false);
                }
                out.push_str(&format!("</{}>", tag));
            }
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A borrowed handle to an element inside a `Document`
#[derive(Clone, Copy)]
pub struct Element<'a> {
    document: &'a Document,
    id: NodeId,
}

impl<'a> Element<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The arena holding this element, whether or not the element is connected
    pub fn arena(&self) -> &'a Document {
        self.document
    }

    /// The owning document, only when the element is attached to it
    pub fn owner_document(&self) -> Option<&'a Document> {
        self.document.is_connected(self.id).then_some(self.document)
    }

    pub fn tag_name(&self) -> &'a str {
        self.document.tag_name(self.id).unwrap_or_default()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.document.attr(self.id, name)
    }

    pub fn is_document_element(&self) -> bool {
        self.document.document_element() == Some(self.id)
    }

    pub fn is_body(&self) -> bool {
        self.document.body() == Some(self.id)
    }
}

impl fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("tag", &self.tag_name())
            .finish()
    }
}

impl<'a> Element<'a> {
    /// Whether this element matches any selector of the group
    pub fn matches(&self, selector: &Selector) -> bool {
        let mut context = MatchingContext::new(MatchingMode::Normal, None, None, QuirksMode::NoQuirks);
        selector
            .selectors
            .iter()
            .any(|s| matching::matches_selector(s, 0, None, self, &mut context, &mut |_, _| {}))
    }

    fn siblings(&self) -> (&'a [NodeId], usize) {
        let siblings = self
            .document
            .node(self.id)
            .and_then(|n| n.parent)
            .map(|p| self.document.children(p))
            .unwrap_or(&[]);
        let pos = siblings.iter().position(|&c| c == self.id).unwrap_or(siblings.len());
        (siblings, pos)
    }
}

/// Arena elements never match non-tree-structural pseudo-classes.
impl<'a> selectors::Element for Element<'a> {
    type Impl = Simple;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(&self.document.nodes[self.id])
    }

    fn parent_element(&self) -> Option<Self> {
        let parent = self.document.node(self.id)?.parent?;
        self.document.element(parent)
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        let (siblings, pos) = self.siblings();
        siblings[..pos].iter().rev().find_map(|&c| self.document.element(c))
    }

    fn next_sibling_element(&self) -> Option<Self> {
        let (siblings, pos) = self.siblings();
        siblings.get(pos + 1..)?.iter().find_map(|&c| self.document.element(c))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, name: &<Simple as SelectorImpl>::BorrowedLocalName) -> bool {
        self.tag_name() == &**name
    }

    fn has_namespace(&self, ns: &<Simple as SelectorImpl>::BorrowedNamespaceUrl) -> bool {
        &**ns == XHTML_NS
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.tag_name() == other.tag_name()
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&<Simple as SelectorImpl>::NamespaceUrl>,
        local_name: &<Simple as SelectorImpl>::LocalName,
        operation: &AttrSelectorOperation<&<Simple as SelectorImpl>::AttrValue>,
    ) -> bool {
        if matches!(*ns, NamespaceConstraint::Specific(url) if !url.is_empty()) {
            return false;
        }
        self.attr(local_name).is_some_and(|value| operation.eval_str(value))
    }

    fn match_non_ts_pseudo_class<F>(
        &self,
        _pc: &NonTSPseudoClass,
        _context: &mut MatchingContext<Self::Impl>,
        _flags_setter: &mut F,
    ) -> bool {
        false
    }

    fn match_pseudo_element(&self, _pe: &PseudoElement, _context: &mut MatchingContext<Self::Impl>) -> bool {
        false
    }

    fn is_link(&self) -> bool {
        matches!(self.tag_name(), "a" | "area" | "link") && self.attr("href").is_some()
    }

    fn is_html_slot_element(&self) -> bool {
        self.tag_name() == "slot"
    }

    fn has_id(&self, id: &<Simple as SelectorImpl>::Identifier, case_sensitivity: CaseSensitivity) -> bool {
        self.attr("id")
            .is_some_and(|value| case_sensitivity.eq(id.as_bytes(), value.as_bytes()))
    }

    fn has_class(&self, name: &<Simple as SelectorImpl>::ClassName, case_sensitivity: CaseSensitivity) -> bool {
        self.attr("class").is_some_and(|value| {
            value
                .split_whitespace()
                .any(|class| case_sensitivity.eq(name.as_bytes(), class.as_bytes()))
        })
    }

    fn exported_part(&self, _name: &<Simple as SelectorImpl>::PartName) -> Option<<Simple as SelectorImpl>::PartName> {
        None
    }

    fn imported_part(&self, _name: &<Simple as SelectorImpl>::PartName) -> Option<<Simple as SelectorImpl>::PartName> {
        None
    }

    fn is_part(&self, _name: &<Simple as SelectorImpl>::PartName) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        !self
            .document
            .children(self.id)
            .iter()
            .any(|&c| match &self.document.nodes[c].kind {
                NodeKind::Element { .. } => true,
                NodeKind::Text(t) => !t.is_empty(),
            })
    }

    fn is_root(&self) -> bool {
        self.is_document_element()
    }
}
