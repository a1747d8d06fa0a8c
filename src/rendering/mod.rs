//! Rendering backends and the dispatcher choosing between them.
//!
//! Two backends sit behind the same `RenderBackend` capability:
//! - `foreign_object`: serializes the duplicated subtree into an SVG
//!   `<foreignObject>` and rasterizes that;
//! - `canvas`: resolves the subtree into an `ElementContainer` render tree
//!   and paints it command by command.

pub mod canvas;
pub mod foreign_object;
pub mod paint;
pub mod raster;
pub mod tree;

use crate::bounds::CaptureRegion;
use crate::clone::ClonedDocument;
use crate::color::{Color, TRANSPARENT};
use crate::instance::{InstanceId, InstanceLogger};
use crate::resource::ResourceCache;
use crate::{Error, Result};
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::sync::Arc;

pub use canvas::CanvasRenderer;
pub use foreign_object::{build_svg, ForeignObjectRenderer, NoopSvgRasterizer, SvgRasterizer, XhtmlSvgRasterizer};
pub use tree::{ElementContainer, InlineStyleResolver, StyleResolver};

/// An RGBA8 pixel buffer, row-major, non-premultiplied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSurface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterSurface {
    /// A fully transparent surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let p = self.pixels.get(i..i + 4)?;
        Some(Color::rgba(p[0], p[1], p[2], p[3]))
    }

    /// Fails unless the buffer holds exactly `width * height` RGBA pixels
    pub fn validate(&self) -> Result<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(Error::BackendRender(format!(
                "surface buffer holds {} bytes, {}x{} needs {}",
                self.pixels.len(),
                self.width,
                self.height,
                expected
            )));
        }
        Ok(())
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.chunks_exact(4).all(|p| p[3] == 0)
    }

    /// Encode as PNG
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| Error::BackendRender("surface buffer does not match its dimensions".into()))?;
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        Ok(buf)
    }

    /// Content hash of the surface (dimensions and pixels), hex encoded
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        hasher.update(&self.pixels);
        hex::encode(hasher.finalize())
    }
}

/// Everything a backend needs besides the root it renders
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub instance: InstanceId,
    pub logger: InstanceLogger,
    pub cache: Arc<ResourceCache>,
    /// Surface to draw into instead of allocating one
    pub canvas: Option<RasterSurface>,
    pub background_color: Color,
    pub scale: f32,
    pub region: CaptureRegion,
    pub window_width: u32,
    pub window_height: u32,
}

impl RenderOptions {
    /// Output size in device pixels
    pub fn surface_size(&self) -> (u32, u32) {
        (
            (self.region.width as f32 * self.scale).ceil() as u32,
            (self.region.height as f32 * self.scale).ceil() as u32,
        )
    }
}

/// Produces a raster surface from a root of type `Root`
pub trait RenderBackend<Root: ?Sized>: Send + Sync {
    fn render<'a>(&'a self, root: &'a Root, options: &'a RenderOptions) -> BoxFuture<'a, Result<RasterSurface>>;
}

/// Which backend a call is dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    ForeignObject,
    Canvas,
}

impl BackendKind {
    pub fn from_flag(foreign_object_rendering: bool) -> Self {
        if foreign_object_rendering {
            BackendKind::ForeignObject
        } else {
            BackendKind::Canvas
        }
    }
}

/// Start a surface for `options`: the caller's canvas or a new one, filled
/// with the background color.
pub(crate) fn prepare_surface(options: &RenderOptions) -> Result<RasterSurface> {
    let mut surface = match &options.canvas {
        Some(canvas) => {
            canvas.validate()?;
            canvas.clone()
        }
        None => {
            let (w, h) = options.surface_size();
            RasterSurface::new(w, h)
        }
    };
    if !options.background_color.is_transparent() {
        let fill = paint::PaintCommand::SolidRect {
            x: 0,
            y: 0,
            width: surface.width,
            height: surface.height,
            rgba: options.background_color,
        };
        raster::rasterize(&mut surface, &[fill]);
    }
    Ok(surface)
}

/// Clear the tree root's own background when the surface fill already paints
/// the same color. Returns whether the tree was changed.
pub fn apply_background_fixup(tree: &mut ElementContainer, background: Color) -> bool {
    if tree.background_color == background {
        tree.background_color = TRANSPARENT;
        true
    } else {
        false
    }
}

fn into_backend_error(err: Error) -> Error {
    match err {
        Error::BackendRender(_) => err,
        other => Error::BackendRender(other.to_string()),
    }
}

/// Sends a duplicated subtree to exactly one backend
#[derive(Clone)]
pub struct RenderDispatcher {
    foreign_object: Arc<dyn RenderBackend<ClonedDocument>>,
    canvas: Arc<dyn RenderBackend<ElementContainer>>,
    styles: Arc<dyn StyleResolver>,
}

impl Default for RenderDispatcher {
    fn default() -> Self {
        Self {
            foreign_object: Arc::new(ForeignObjectRenderer::default()),
            canvas: Arc::new(CanvasRenderer::new()),
            styles: Arc::new(InlineStyleResolver::new()),
        }
    }
}

impl RenderDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_foreign_object_backend(mut self, backend: Arc<dyn RenderBackend<ClonedDocument>>) -> Self {
        self.foreign_object = backend;
        self
    }

    pub fn with_canvas_backend(mut self, backend: Arc<dyn RenderBackend<ElementContainer>>) -> Self {
        self.canvas = backend;
        self
    }

    pub fn with_style_resolver(mut self, styles: Arc<dyn StyleResolver>) -> Self {
        self.styles = styles;
        self
    }

    pub async fn render(&self, clone: &ClonedDocument, options: &RenderOptions, kind: BackendKind) -> Result<RasterSurface> {
        let logger = &options.logger;
        let result = match kind {
            BackendKind::ForeignObject => {
                logger.debug("Document cloned, using foreign object rendering");
                self.foreign_object.render(clone, options).await
            }
            BackendKind::Canvas => {
                logger.debug("Document cloned, using computed rendering");
                match self.styles.parse_tree(&clone.document, clone.root) {
                    Ok(mut tree) => {
                        if apply_background_fixup(&mut tree, options.background_color) {
                            logger.debug("Root background matches the surface fill, clearing it");
                        }
                        logger.debug(format!("Starting renderer for element at {:?}", tree.bounds));
                        self.canvas.render(&tree, options).await
                    }
                    Err(e) => Err(e),
                }
            }
        };
        result.map_err(|e| {
            logger.error(format!("Render failed: {}", e));
            into_backend_error(e)
        })
    }
}
