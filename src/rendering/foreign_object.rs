//! SVG `<foreignObject>` backend.
//!
//! The duplicated document is serialized as XHTML, wrapped in an SVG whose
//! `viewBox` selects the capture region, and handed to an `SvgRasterizer`.
//! The rasterized layer is composited over the prepared background.

use super::paint::paint_tree_at;
use super::raster::{composite, rasterize};
use super::tree::{InlineStyleResolver, StyleResolver};
use super::{prepare_surface, RasterSurface, RenderBackend, RenderOptions};
use crate::clone::ClonedDocument;
use crate::dom::{Document, NodeId, Window};
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Turns an SVG document into pixels
pub trait SvgRasterizer: Send + Sync {
    fn rasterize<'a>(&'a self, svg: &'a str, width: u32, height: u32) -> BoxFuture<'a, Result<RasterSurface>>;
}

/// Produces an empty layer; only the background shows
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSvgRasterizer;

impl SvgRasterizer for NoopSvgRasterizer {
    fn rasterize<'a>(&'a self, _svg: &'a str, width: u32, height: u32) -> BoxFuture<'a, Result<RasterSurface>> {
        Box::pin(async move { Ok(RasterSurface::new(width, height)) })
    }
}

/// Re-parses the XHTML payload of the `<foreignObject>` and paints it with
/// the inline-style layout. External images are not loaded, the same as a
/// browser rasterizing an SVG image.
#[derive(Debug, Clone, Copy, Default)]
pub struct XhtmlSvgRasterizer;

impl SvgRasterizer for XhtmlSvgRasterizer {
    fn rasterize<'a>(&'a self, svg: &'a str, width: u32, height: u32) -> BoxFuture<'a, Result<RasterSurface>> {
        Box::pin(async move {
            let svg_tag = svg
                .strip_prefix("<svg")
                .and_then(|rest| rest.split_once('>'))
                .map(|(attrs, _)| attrs)
                .ok_or_else(|| Error::BackendRender("not an svg document".into()))?;
            let view_box: Vec<f64> = attribute(svg_tag, "viewBox")
                .unwrap_or_default()
                .split_whitespace()
                .filter_map(|v| v.parse().ok())
                .collect();
            let [vx, vy, vw, _vh] = view_box[..] else {
                return Err(Error::BackendRender("svg has no usable viewBox".into()));
            };

            let open = svg
                .find("<foreignObject")
                .ok_or_else(|| Error::BackendRender("svg has no foreignObject".into()))?;
            let fo_tag_end = svg[open..].find('>').map(|i| open + i + 1).unwrap_or(svg.len());
            let fo_attrs = &svg[open + "<foreignObject".len()..fo_tag_end - 1];
            let close = svg.rfind("</foreignObject>").unwrap_or(svg.len());
            let xhtml = svg.get(fo_tag_end..close).unwrap_or_default();

            let parse_dim = |name: &str| attribute(fo_attrs, name).and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
            let window = Window {
                width: parse_dim("width"),
                height: parse_dim("height"),
                ..Default::default()
            };
            let document = Document::parse_html(xhtml).with_window(window);

            let mut layer = RasterSurface::new(width, height);
            let Some(root) = document.document_element() else {
                return Ok(layer);
            };
            let tree = InlineStyleResolver::new().parse_tree(&document, root)?;
            let scale = if vw > 0.0 { width as f64 / vw } else { 1.0 };
            let commands = paint_tree_at(&tree, (vx, vy), scale, &HashMap::new());
            rasterize(&mut layer, &commands);
            Ok(layer)
        })
    }
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}

/// Wrap the document holding `root` in an SVG sized to the output surface.
///
/// The whole document element is serialized so that inherited context
/// survives; the `viewBox` crops to the capture region.
pub fn build_svg(document: &Document, root: NodeId, options: &RenderOptions) -> String {
    let (width, height) = options.surface_size();
    let region = &options.region;
    let body = document
        .document_element()
        .map(|el| document.serialize(el))
        .unwrap_or_else(|| document.serialize(root));
    format!(
        "<svg xmlns=\"{ns}\" width=\"{w}\" height=\"{h}\" viewBox=\"{x} {y} {rw} {rh}\">\
         <foreignObject x=\"0\" y=\"0\" width=\"{ww}\" height=\"{wh}\" externalResourcesRequired=\"true\">{body}</foreignObject></svg>",
        ns = SVG_NS,
        w = width,
        h = height,
        x = region.x,
        y = region.y,
        rw = region.width,
        rh = region.height,
        ww = options.window_width,
        wh = options.window_height,
        body = body,
    )
}

#[derive(Clone)]
pub struct ForeignObjectRenderer {
    rasterizer: Arc<dyn SvgRasterizer>,
}

impl Default for ForeignObjectRenderer {
    fn default() -> Self {
        Self::new(Arc::new(XhtmlSvgRasterizer))
    }
}

impl ForeignObjectRenderer {
    pub fn new(rasterizer: Arc<dyn SvgRasterizer>) -> Self {
        Self { rasterizer }
    }
}

impl RenderBackend<ClonedDocument> for ForeignObjectRenderer {
    fn render<'a>(&'a self, clone: &'a ClonedDocument, options: &'a RenderOptions) -> BoxFuture<'a, Result<RasterSurface>> {
        Box::pin(async move {
            let mut surface = prepare_surface(options)?;
            let svg = build_svg(&clone.document, clone.root, options);
            options.logger.debug(format!("Rasterizing foreignObject svg ({} bytes)", svg.len()));
            let layer = self.rasterizer.rasterize(&svg, surface.width, surface.height).await?;
            composite(&mut surface, &layer);
            Ok(surface)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::CaptureRegion;
    use crate::color::{Color, TRANSPARENT};
    use crate::config::ResourceOptions;
    use crate::frame::FrameHandle;
    use crate::instance::InstanceRegistry;
    use crate::resource::NoopFetcher;

    fn options(region: CaptureRegion, background: Color) -> RenderOptions {
        let registry = InstanceRegistry::new();
        let instance = registry.register(false, &ResourceOptions::default(), None, None, Arc::new(NoopFetcher));
        RenderOptions {
            instance: instance.id,
            logger: instance.logger,
            cache: instance.cache,
            canvas: None,
            background_color: background,
            scale: 1.0,
            region,
            window_width: 20,
            window_height: 20,
        }
    }

    fn cloned(html: &str) -> ClonedDocument {
        let doc = Document::parse_html(html);
        let root = doc.query_selector("#target").unwrap();
        let frame = FrameHandle::new(doc, Window { width: 20, height: 20, ..Default::default() });
        ClonedDocument { root, document: frame.document(), frame, ownership: crate::clone::FrameOwnership::Owned }
    }

    #[test]
    fn svg_crops_to_region() {
        let clone = cloned(r#"<html><body><div id="target">hi</div></body></html>"#);
        let opts = options(CaptureRegion::new(3.0, 4.0, 5.0, 6.0, 0.0, 0.0, 1.0), TRANSPARENT);
        let svg = build_svg(&clone.document, clone.root, &opts);
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"5\" height=\"6\""));
        assert!(svg.contains("viewBox=\"3 4 5 6\""));
        assert!(svg.contains("<foreignObject x=\"0\" y=\"0\" width=\"20\" height=\"20\""));
        assert!(svg.contains("<div id=\"target\">hi</div>"));
        assert!(svg.ends_with("</foreignObject></svg>"));
    }

    #[tokio::test]
    async fn noop_rasterizer_leaves_background() {
        let clone = cloned(r#"<html><body><div id="target" style="background: red">x</div></body></html>"#);
        let opts = options(CaptureRegion::new(0.0, 0.0, 4.0, 4.0, 0.0, 0.0, 1.0), Color::WHITE);
        let renderer = ForeignObjectRenderer::new(Arc::new(NoopSvgRasterizer));
        let surface = renderer.render(&clone, &opts).await.unwrap();
        assert_eq!(surface.pixel(1, 1), Some(Color::WHITE));
    }

    #[tokio::test]
    async fn xhtml_rasterizer_paints_document() {
        let clone = cloned(
            r#"<html><body style="margin: 0"><div id="target" style="background: #0000ff; height: 10px"></div></body></html>"#,
        );
        let opts = options(CaptureRegion::new(0.0, 0.0, 4.0, 4.0, 0.0, 0.0, 1.0), Color::WHITE);
        let surface = ForeignObjectRenderer::default().render(&clone, &opts).await.unwrap();
        assert_eq!(surface.pixel(2, 2), Some(Color::rgb(0, 0, 255)));
    }
}
