//! Computed-style backend: paints an `ElementContainer` tree command by command

use super::paint::paint_tree;
use super::raster::rasterize;
use super::tree::ElementContainer;
use super::{prepare_surface, RasterSurface, RenderBackend, RenderOptions};
use crate::{Error, Result};
use futures::future::BoxFuture;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct CanvasRenderer;

impl CanvasRenderer {
    pub fn new() -> Self {
        CanvasRenderer
    }

    /// Register every image source in the tree, wait for the cache and decode
    /// what loaded. Sources blocked by the resource policy are left out.
    async fn load_images(&self, tree: &ElementContainer, options: &RenderOptions) -> Result<HashMap<String, Arc<RgbaImage>>> {
        let mut sources = Vec::new();
        tree.walk(&mut |c| {
            if let Some(src) = &c.image {
                sources.push(src.clone());
            }
        });

        let cache = &options.cache;
        for src in &sources {
            if !cache.add_image(src) {
                options.logger.debug(format!("Skipping image {}", src));
            }
        }
        cache.resolve_all().await?;

        let mut images = HashMap::new();
        for src in sources {
            if images.contains_key(&src) {
                continue;
            }
            if let Some(bytes) = cache.get(&src) {
                let decoded = image::load_from_memory(&bytes)
                    .map_err(|e| Error::BackendRender(format!("cannot decode {}: {}", src, e)))?
                    .to_rgba8();
                images.insert(src, Arc::new(decoded));
            }
        }
        Ok(images)
    }
}

impl RenderBackend<ElementContainer> for CanvasRenderer {
    fn render<'a>(&'a self, tree: &'a ElementContainer, options: &'a RenderOptions) -> BoxFuture<'a, Result<RasterSurface>> {
        Box::pin(async move {
            let images = self.load_images(tree, options).await?;
            let mut surface = prepare_surface(options)?;
            let commands = paint_tree(tree, options, &images);
            options.logger.debug(format!(
                "Painting {} commands onto {}x{}",
                commands.len(),
                surface.width,
                surface.height
            ));
            rasterize(&mut surface, &commands);
            Ok(surface)
        })
    }
}
