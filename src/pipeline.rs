//! The capture pipeline: one call turns an element into a raster surface.

use crate::background;
use crate::bounds::{Bounds, BoundsResolver, CaptureRegion, StyleBoundsResolver};
use crate::clone::{CloneCoordinator, DocumentCloner, DomCloner};
use crate::config::CaptureConfig;
use crate::dom::{Element, Window};
use crate::frame::NamedFrameCache;
use crate::instance::InstanceRegistry;
use crate::rendering::{BackendKind, RasterSurface, RenderDispatcher, RenderOptions};
use crate::resource::{Fetcher, NoopFetcher};
use crate::teardown::Teardown;
use crate::{Error, Result};
use std::sync::Arc;

/// Captures elements into raster surfaces.
///
/// A `Capturer` owns the instance registry and the named-frame cache, so
/// every call made through the same capturer can reuse frames stored under a
/// render name. Collaborators are swappable through the `with_*` builders.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> rfcapture::Result<()> {
/// use rfcapture::{CaptureConfig, Capturer, Document, Window};
///
/// let doc = Document::parse_html(r#"<html><body><div id="card" style="height: 20px; background: navy"></div></body></html>"#)
///     .with_window(Window { width: 64, height: 32, ..Default::default() });
/// let card = doc.element(doc.query_selector("#card").unwrap()).unwrap();
///
/// let capturer = Capturer::new();
/// let surface = capturer.render(card, CaptureConfig::default()).await?;
/// assert_eq!((surface.width, surface.height), (64, 20));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Capturer {
    registry: Arc<InstanceRegistry>,
    frames: NamedFrameCache,
    cloner: Arc<dyn DocumentCloner>,
    bounds: Arc<dyn BoundsResolver>,
    dispatcher: RenderDispatcher,
    fetcher: Arc<dyn Fetcher>,
}

impl Default for Capturer {
    fn default() -> Self {
        Self::new()
    }
}

impl Capturer {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(InstanceRegistry::new()),
            frames: NamedFrameCache::new(),
            cloner: Arc::new(DomCloner::new()),
            bounds: Arc::new(StyleBoundsResolver::new()),
            dispatcher: RenderDispatcher::new(),
            fetcher: default_fetcher(),
        }
    }

    pub fn with_cloner(mut self, cloner: Arc<dyn DocumentCloner>) -> Self {
        self.cloner = cloner;
        self
    }

    pub fn with_bounds_resolver(mut self, bounds: Arc<dyn BoundsResolver>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: RenderDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn frames(&self) -> &NamedFrameCache {
        &self.frames
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Capture `element` according to `config`.
    ///
    /// Fails with `Error::Precondition` before anything is allocated when the
    /// element is detached or its document has no window.
    pub async fn render(&self, element: Element<'_>, config: CaptureConfig) -> Result<RasterSurface> {
        let document = element
            .owner_document()
            .ok_or_else(|| Error::Precondition("Element is not attached to a Document".into()))?;
        let default_view = document
            .window()
            .ok_or_else(|| Error::Precondition("Document is not attached to a Window".into()))?;

        // held until the call returns
        let _name_guard = match config.render_name.as_deref() {
            Some(name) => Some(self.frames.acquire(name).await),
            None => None,
        };

        let capture_document = element.is_document_element() || element.is_body();
        let Bounds { left, top, width, height } = if capture_document {
            self.bounds.document_capture_rect(document)
        } else {
            self.bounds.capture_rect_for(&element)
        };

        let scale = config.scale.unwrap_or(default_view.device_pixel_ratio);
        let window = Window {
            width: config.window_width.unwrap_or(default_view.width),
            height: config.window_height.unwrap_or(default_view.height),
            scroll_x: config.scroll_x.unwrap_or(default_view.scroll_x),
            scroll_y: config.scroll_y.unwrap_or(default_view.scroll_y),
            device_pixel_ratio: default_view.device_pixel_ratio,
        };
        let region = CaptureRegion::new(
            config.x.unwrap_or(left),
            config.y.unwrap_or(top),
            config.width.unwrap_or(width),
            config.height.unwrap_or(height),
            window.scroll_x,
            window.scroll_y,
            scale,
        );

        let instance = self.registry.register(
            config.logging,
            &config.resources,
            config.cache.clone(),
            document.url(),
            self.fetcher.clone(),
        );
        let logger = instance.logger.clone();
        let mut teardown = Teardown::new(
            self.registry.clone(),
            self.frames.clone(),
            self.cloner.clone(),
            instance.id,
            logger.clone(),
            config.remove_container,
            config.render_name.clone(),
        );

        logger.debug(format!(
            "Starting document clone with size {}x{} scrolled to {},{}",
            window.width, window.height, -window.scroll_x, -window.scroll_y
        ));
        let coordinator = CloneCoordinator::new(self.cloner.as_ref(), &self.frames);
        let clone = coordinator.duplicate(element, &config, window, &logger).await?;
        teardown.adopt(clone.frame.clone(), clone.ownership);

        let cloned = &clone.document;
        let background_color = background::resolve(
            element.is_document_element(),
            cloned.document_element().map(|id| cloned.computed_background(id)).unwrap_or_default(),
            cloned.body().map(|id| cloned.computed_background(id)).unwrap_or_default(),
            &config.background_color,
        )?;

        let options = RenderOptions {
            instance: instance.id,
            logger: logger.clone(),
            cache: instance.cache.clone(),
            canvas: config.canvas.clone(),
            background_color,
            scale,
            region,
            window_width: window.width,
            window_height: window.height,
        };
        let surface = self
            .dispatcher
            .render(&clone, &options, BackendKind::from_flag(config.foreign_object_rendering))
            .await?;

        teardown.finish();
        Ok(surface)
    }
}

#[cfg(feature = "http")]
fn default_fetcher() -> Arc<dyn Fetcher> {
    match crate::resource::HttpFetcher::new() {
        Ok(f) => Arc::new(f),
        Err(e) => {
            log::warn!(target: "rfcapture", "HTTP fetcher unavailable, remote resources will fail: {}", e);
            Arc::new(NoopFetcher)
        }
    }
}

#[cfg(not(feature = "http"))]
fn default_fetcher() -> Arc<dyn Fetcher> {
    Arc::new(NoopFetcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::config::BackgroundOption;
    use crate::dom::Document;

    fn page(html: &str) -> Document {
        Document::parse_html(html).with_window(Window { width: 40, height: 30, ..Default::default() })
    }

    #[tokio::test]
    async fn element_capture_uses_its_box() {
        let doc = page(r#"<html><body><div style="height: 5px"></div><p id="p" style="height: 10px; width: 20px; background: red"></p></body></html>"#);
        let p = doc.element(doc.query_selector("#p").unwrap()).unwrap();
        let cfg = CaptureConfig { background_color: BackgroundOption::Transparent, ..Default::default() };
        let surface = Capturer::new().render(p, cfg).await.unwrap();
        assert_eq!((surface.width, surface.height), (20, 10));
        assert_eq!(surface.pixel(0, 0), Some(Color::rgb(255, 0, 0)));
    }

    #[tokio::test]
    async fn body_capture_covers_document() {
        let doc = page(r#"<html><body style="background: #00ff00"><div style="height: 50px"></div></body></html>"#);
        let body = doc.element(doc.body().unwrap()).unwrap();
        let surface = Capturer::new().render(body, CaptureConfig::default()).await.unwrap();
        assert_eq!((surface.width, surface.height), (40, 50));
        // body is not the document element: white fill, body paints over it
        assert_eq!(surface.pixel(0, 49), Some(Color::rgb(0, 255, 0)));
    }

    #[tokio::test]
    async fn overrides_and_scale_size_the_surface() {
        let doc = page("<html><body></body></html>");
        let root = doc.element(doc.document_element().unwrap()).unwrap();
        let cfg = CaptureConfig {
            scale: Some(2.0),
            width: Some(10.5),
            height: Some(4.0),
            ..Default::default()
        };
        let surface = Capturer::new().render(root, cfg).await.unwrap();
        assert_eq!((surface.width, surface.height), (22, 8));
    }

    #[tokio::test]
    async fn document_without_window_is_rejected() {
        let doc = Document::parse_html("<html><body><p id=\"p\"></p></body></html>");
        let p = doc.element(doc.query_selector("#p").unwrap()).unwrap();
        let capturer = Capturer::new();
        let err = capturer.render(p, CaptureConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert_eq!(capturer.registry().issued(), 0);
    }

    #[tokio::test]
    async fn invalid_background_releases_instance() {
        let doc = page("<html><body><p id=\"p\" style=\"height: 2px\"></p></body></html>");
        let p = doc.element(doc.query_selector("#p").unwrap()).unwrap();
        let capturer = Capturer::new();
        let cfg = CaptureConfig {
            background_color: BackgroundOption::Color("nope".into()),
            ..Default::default()
        };
        let err = capturer.render(p, cfg).await.unwrap_err();
        assert!(matches!(err, Error::InvalidColor(_)));
        assert_eq!(capturer.registry().issued(), 1);
        assert_eq!(capturer.registry().active(), 0);
    }
}
