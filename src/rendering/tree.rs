//! Style-resolved render tree consumed by the canvas backend

use crate::bounds::{Bounds, StyleBoundsResolver};
use crate::color::Color;
use crate::dom::{Document, NodeId};
use crate::{Error, Result};

/// One element with its resolved geometry and paint-relevant styles
#[derive(Debug, Clone, PartialEq)]
pub struct ElementContainer {
    pub node: NodeId,
    pub tag: String,
    pub bounds: Bounds,
    pub background_color: Color,
    /// Source of the image drawn in the content box (`<img src>`)
    pub image: Option<String>,
    pub children: Vec<ElementContainer>,
}

impl ElementContainer {
    pub fn leaf(node: NodeId, tag: &str, bounds: Bounds, background_color: Color) -> Self {
        Self {
            node,
            tag: tag.to_string(),
            bounds,
            background_color,
            image: None,
            children: Vec::new(),
        }
    }

    /// Pre-order traversal
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a ElementContainer)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(ElementContainer::count).sum::<usize>()
    }
}

/// Turns a duplicated subtree into a render tree
pub trait StyleResolver: Send + Sync {
    fn parse_tree(&self, document: &Document, root: NodeId) -> Result<ElementContainer>;
}

/// Resolves backgrounds from inline styles and geometry from the block-flow
/// layout. Elements with `display: none` or `visibility: hidden` are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineStyleResolver;

impl InlineStyleResolver {
    pub fn new() -> Self {
        InlineStyleResolver
    }
}

impl StyleResolver for InlineStyleResolver {
    fn parse_tree(&self, document: &Document, root: NodeId) -> Result<ElementContainer> {
        if document.tag_name(root).is_none() {
            return Err(Error::BackendRender(format!("render root {} is not an element", root)));
        }
        let layout = StyleBoundsResolver::layout(document);
        let resolve = |id: NodeId| layout.get(id).unwrap_or_default();
        Ok(build(document, root, &resolve))
    }
}

fn is_rendered(document: &Document, id: NodeId) -> bool {
    let hidden = |prop: &str, value: &str| {
        document
            .style_property(id, prop)
            .is_some_and(|v| v.eq_ignore_ascii_case(value))
    };
    !hidden("display", "none") && !hidden("visibility", "hidden")
}

fn build(document: &Document, id: NodeId, bounds: &dyn Fn(NodeId) -> Bounds) -> ElementContainer {
    let tag = document.tag_name(id).unwrap_or_default();
    let mut container = ElementContainer::leaf(id, tag, bounds(id), document.computed_background(id));
    if tag == "img" {
        container.image = document.attr(id, "src").map(str::to_string);
    }
    container.children = document
        .child_elements(id)
        .filter(|&c| is_rendered(document, c))
        .map(|c| build(document, c, bounds))
        .collect();
    container
}
