//! Element bounds and the capture region.
//!
//! `StyleBoundsResolver` is a very small block-flow layout: blocks stack
//! vertically, inline `left/top/width/height/padding` in px (or `%` widths)
//! are honoured, absolutely positioned elements leave the flow, and text
//! wraps at a fixed 8px glyph cell.

use crate::dom::{Document, Element, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const GLYPH_SIZE: f64 = 8.0;
const HIDDEN_TAGS: &[&str] = &["head", "script", "style", "title", "meta", "link", "template"];

/// A rectangle in document pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// The rectangle to rasterize, in document pixels.
///
/// Width and height are whole pixels (rounded up) so the output surface size
/// is always well defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRegion {
    pub x: f64,
    pub y: f64,
    pub width: u32,
    pub height: u32,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub device_scale: f32,
}

impl CaptureRegion {
    #[allow(clippy::too_many_arguments)]
    pub fn new(x: f64, y: f64, width: f64, height: f64, scroll_x: f64, scroll_y: f64, device_scale: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0).ceil() as u32,
            height: height.max(0.0).ceil() as u32,
            scroll_x,
            scroll_y,
            device_scale,
        }
    }
}

/// Computes capture rectangles for elements and whole documents
pub trait BoundsResolver: Send + Sync {
    fn capture_rect_for(&self, element: &Element<'_>) -> Bounds;
    fn document_capture_rect(&self, document: &Document) -> Bounds;
}

/// Layout results for every element of a document
#[derive(Debug, Clone, Default)]
pub struct Layout {
    boxes: HashMap<NodeId, Bounds>,
}

impl Layout {
    pub fn get(&self, id: NodeId) -> Option<Bounds> {
        self.boxes.get(&id).copied()
    }
}

/// Block-flow bounds computed from inline styles
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleBoundsResolver;

impl StyleBoundsResolver {
    pub fn new() -> Self {
        StyleBoundsResolver
    }

    /// Lay out the connected tree of `document` against its window width
    pub fn layout(document: &Document) -> Layout {
        let mut layout = Layout::default();
        if let Some(root) = document.document_element() {
            let width = document.window().unwrap_or_default().width as f64;
            layout_node(document, root, 0.0, 0.0, width, &mut layout.boxes);
        }
        layout
    }
}

impl BoundsResolver for StyleBoundsResolver {
    fn capture_rect_for(&self, element: &Element<'_>) -> Bounds {
        Self::layout(element.arena()).get(element.id()).unwrap_or_default()
    }

    fn document_capture_rect(&self, document: &Document) -> Bounds {
        let window = document.window().unwrap_or_default();
        let root = document
            .document_element()
            .and_then(|r| Self::layout(document).get(r))
            .unwrap_or_default();
        Bounds::new(
            0.0,
            0.0,
            root.width.max(window.width as f64),
            root.height.max(window.height as f64),
        )
    }
}

fn px(value: Option<String>, percent_of: f64) -> Option<f64> {
    let v = value?;
    let v = v.trim();
    if let Some(pct) = v.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().map(|p| p / 100.0 * percent_of);
    }
    v.trim_end_matches("px").trim().parse().ok()
}

fn layout_node(doc: &Document, id: NodeId, left: f64, top: f64, avail: f64, out: &mut HashMap<NodeId, Bounds>) -> f64 {
    let Some(node) = doc.node(id) else { return 0.0 };
    let tag = match &node.kind {
        NodeKind::Text(text) => {
            let chars = text.split_whitespace().collect::<Vec<_>>().join(" ").chars().count();
            if chars == 0 {
                return 0.0;
            }
            let per_line = ((avail / GLYPH_SIZE).floor() as usize).max(1);
            let lines = chars.div_ceil(per_line);
            return lines as f64 * GLYPH_SIZE;
        }
        NodeKind::Element { tag, .. } => tag.as_str(),
    };

    let display_none = doc
        .style_property(id, "display")
        .is_some_and(|d| d.eq_ignore_ascii_case("none"));
    if HIDDEN_TAGS.contains(&tag) || display_none {
        out.insert(id, Bounds::new(left, top, 0.0, 0.0));
        return 0.0;
    }

    let position = doc.style_property(id, "position").unwrap_or_default();
    let out_of_flow = position == "absolute" || position == "fixed";
    let x = left + px(doc.style_property(id, "left"), avail).unwrap_or(0.0);
    let y = top + px(doc.style_property(id, "top"), avail).unwrap_or(0.0);
    let padding = px(doc.style_property(id, "padding"), avail).unwrap_or(0.0);

    let width = px(doc.style_property(id, "width"), avail)
        .or_else(|| doc.attr(id, "width").and_then(|w| w.parse().ok()))
        .unwrap_or(avail);
    let inner = (width - padding * 2.0).max(0.0);

    let mut cursor = y + padding;
    for &child in doc.children(id) {
        cursor += layout_node(doc, child, x + padding, cursor, inner, out);
    }
    let auto_height = cursor - y + padding;
    let height = px(doc.style_property(id, "height"), avail)
        .or_else(|| doc.attr(id, "height").and_then(|h| h.parse().ok()))
        .unwrap_or(auto_height);

    out.insert(id, Bounds::new(x, y, width, height));
    if out_of_flow {
        0.0
    } else {
        height
    }
}
