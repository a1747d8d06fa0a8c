//! Document duplication: the full path (fresh frame) and the fast path
//! (reuse a named frame and swap one node).

use crate::config::{CaptureConfig, FastPathPolicy, IgnoreElements};
use crate::dom::{Document, Element, NodeId, Selector, Window};
use crate::frame::{FrameHandle, NamedFrameCache};
use crate::instance::InstanceLogger;
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Whether the hosting frame belongs to the current call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOwnership {
    /// Created for this call; torn down at the end of it unless persisted
    Owned,
    /// Taken from the named-frame cache; never destroyed by this call
    Borrowed,
}

/// The duplicated subtree and the frame hosting it
#[derive(Debug, Clone)]
pub struct ClonedDocument {
    pub root: NodeId,
    pub document: Arc<Document>,
    pub frame: FrameHandle,
    pub ownership: FrameOwnership,
}

/// Result of the synchronous in-memory duplication
#[derive(Debug, Clone)]
pub struct InMemoryClone {
    pub document: Document,
    /// The duplicate of the target element, if it survived duplication
    pub reference: Option<NodeId>,
}

/// Duplication collaborator
pub trait DocumentCloner: Send + Sync {
    /// Duplicate the whole document of `element` in memory, skipping nodes
    /// rejected by `ignore`, and locate the duplicate of `element`.
    fn duplicate_in_memory(&self, element: &Element<'_>, ignore: Option<&IgnoreElements>) -> InMemoryClone;

    /// Load a duplicated document into a new offscreen frame sized to
    /// `window`. Resolves once the frame has finished loading.
    fn materialize_to_frame(&self, document: Document, window: Window) -> BoxFuture<'_, Result<FrameHandle>>;

    /// Detach a frame. Returns false if it was no longer attached.
    fn destroy_frame(&self, frame: &FrameHandle) -> bool;

    /// Find `selector` inside `frame` and replace it with a duplicate of
    /// `element`, skipping nodes rejected by `ignore` as the full path does.
    /// Resolves to the new node, or `None` if nothing could be re-attached.
    fn attempt_fast_clone<'a>(
        &'a self,
        frame: &'a FrameHandle,
        selector: &'a Selector,
        element: Element<'a>,
        ignore: Option<&'a IgnoreElements>,
    ) -> BoxFuture<'a, Option<NodeId>>;
}

fn keep_node(ignore: Option<&IgnoreElements>, target: NodeId) -> impl Fn(&Document, NodeId) -> bool + '_ {
    move |doc, id| {
        if id == target {
            return true;
        }
        match doc.tag_name(id) {
            Some("script") => false,
            Some(_) => !ignore.is_some_and(|f| f.test(doc, id)),
            None => true,
        }
    }
}

/// Reference duplication over the in-memory `Document`
#[derive(Debug, Clone, Copy, Default)]
pub struct DomCloner;

impl DomCloner {
    pub fn new() -> Self {
        DomCloner
    }
}

impl DocumentCloner for DomCloner {
    fn duplicate_in_memory(&self, element: &Element<'_>, ignore: Option<&IgnoreElements>) -> InMemoryClone {
        let source = element.arena();
        let mut document = Document::default();
        if let Some(url) = source.url() {
            document = document.with_url(url);
        }
        let Some(root) = source.document_element() else {
            return InMemoryClone { document, reference: None };
        };
        let keep = keep_node(ignore, element.id());
        let (copied_root, reference) = document.import_subtree(source, root, Some(element.id()), &keep);
        let document = match copied_root {
            Some(r) => document.with_root(r),
            None => document,
        };
        InMemoryClone { document, reference }
    }

    fn materialize_to_frame(&self, document: Document, window: Window) -> BoxFuture<'_, Result<FrameHandle>> {
        Box::pin(async move {
            if document.document_element().is_none() {
                return Err(Error::CloneResolution("cloned document has no root element".into()));
            }
            let frame = FrameHandle::new(document, window);
            // frame load
            tokio::task::yield_now().await;
            Ok(frame)
        })
    }

    fn destroy_frame(&self, frame: &FrameHandle) -> bool {
        frame.detach()
    }

    fn attempt_fast_clone<'a>(
        &'a self,
        frame: &'a FrameHandle,
        selector: &'a Selector,
        element: Element<'a>,
        ignore: Option<&'a IgnoreElements>,
    ) -> BoxFuture<'a, Option<NodeId>> {
        Box::pin(async move {
            frame.window()?;
            let mut document = (*frame.document()).clone();
            let old = document.select_first(selector)?;
            let keep = keep_node(ignore, element.id());
            let (new_root, _) = document.import_subtree(element.arena(), element.id(), None, &keep);
            let new_root = new_root?;
            document.replace_node(old, new_root).ok()?;
            frame.replace_document(document);
            tokio::task::yield_now().await;
            Some(new_root)
        })
    }
}

/// Chooses between the fast and full duplication paths
pub struct CloneCoordinator<'a> {
    cloner: &'a dyn DocumentCloner,
    frames: &'a NamedFrameCache,
}

impl<'a> CloneCoordinator<'a> {
    pub fn new(cloner: &'a dyn DocumentCloner, frames: &'a NamedFrameCache) -> Self {
        Self { cloner, frames }
    }

    /// The cached frame to reuse, if the fast path qualifies for `config`
    pub fn fast_path_frame(&self, config: &CaptureConfig) -> Option<FrameHandle> {
        config.replace_selector.as_ref()?;
        let name = config.render_name.as_deref()?;
        let frame = self.frames.lookup(name)?;
        frame.window().is_some().then_some(frame)
    }

    pub async fn duplicate(
        &self,
        element: Element<'_>,
        config: &CaptureConfig,
        window: Window,
        logger: &InstanceLogger,
    ) -> Result<ClonedDocument> {
        let replace = config
            .replace_selector
            .as_deref()
            .map(|text| Document::parse_selector(text).map(|parsed| (text, parsed)))
            .transpose()?;
        if let (Some(frame), Some((selector, parsed))) = (self.fast_path_frame(config), replace.as_ref()) {
            logger.debug(format!("Reusing cached frame {} for \"{}\"", frame.id(), selector));
            let ignore = config.ignore_elements.as_ref();
            match self.cloner.attempt_fast_clone(&frame, parsed, element, ignore).await {
                Some(root) => {
                    return Ok(ClonedDocument {
                        root,
                        document: frame.document(),
                        frame,
                        ownership: FrameOwnership::Borrowed,
                    });
                }
                None if config.fast_path_policy == FastPathPolicy::Strict => {
                    return Err(Error::FastClone(format!(
                        "no node matching \"{}\" could be replaced in frame {}",
                        selector,
                        frame.id()
                    )));
                }
                None => logger.warn(format!(
                    "Fast clone into frame {} failed, falling back to full duplication",
                    frame.id()
                )),
            }
        }

        let InMemoryClone { mut document, reference } =
            self.cloner.duplicate_in_memory(&element, config.ignore_elements.as_ref());
        let root = reference.ok_or_else(|| Error::CloneResolution(format!("<{}> was not duplicated", element.tag_name())))?;
        if let Some(hook) = &config.on_clone {
            hook.call(&mut document, root);
        }
        let frame = self.cloner.materialize_to_frame(document, window).await?;
        logger.debug(format!("Document cloned into frame {}", frame.id()));
        Ok(ClonedDocument {
            root,
            document: frame.document(),
            frame,
            ownership: FrameOwnership::Owned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><div id="target"><p class="ad">ad</p><p>keep</p><script>x()</script></div><div id="slot"></div></body></html>"#;

    fn logger() -> InstanceLogger {
        crate::instance::InstanceRegistry::new()
            .register(false, &Default::default(), None, None, Arc::new(crate::resource::NoopFetcher))
            .logger
    }

    #[test]
    fn in_memory_clone_skips_ignored_and_scripts() {
        let doc = Document::parse_html(PAGE);
        let target = doc.element(doc.query_selector("#target").unwrap()).unwrap();
        let ignore = IgnoreElements::new(|d, n| d.attr(n, "class") == Some("ad"));
        let clone = DomCloner.duplicate_in_memory(&target, Some(&ignore));
        let reference = clone.reference.unwrap();
        assert_eq!(clone.document.attr(reference, "id"), Some("target"));
        let text = clone.document.text_content(reference);
        assert!(text.contains("keep"));
        assert!(!text.contains("ad"));
        assert!(!text.contains("x()"));
    }

    #[test]
    fn ignored_target_is_still_duplicated() {
        let doc = Document::parse_html(PAGE);
        let target = doc.element(doc.query_selector("#target").unwrap()).unwrap();
        let ignore = IgnoreElements::new(|d, n| d.attr(n, "id") == Some("target"));
        assert!(DomCloner.duplicate_in_memory(&target, Some(&ignore)).reference.is_some());
    }

    #[tokio::test]
    async fn full_path_when_no_render_name() {
        let doc = Document::parse_html(PAGE).with_window(Window::default());
        let target = doc.element(doc.query_selector("#target").unwrap()).unwrap();
        let frames = NamedFrameCache::new();
        let cloned = CloneCoordinator::new(&DomCloner, &frames)
            .duplicate(target, &CaptureConfig::default(), Window::default(), &logger())
            .await
            .unwrap();
        assert_eq!(cloned.ownership, FrameOwnership::Owned);
        assert_eq!(cloned.document.attr(cloned.root, "id"), Some("target"));
        assert!(cloned.frame.is_alive());
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn fast_path_swaps_selector_in_cached_frame() {
        let doc = Document::parse_html(PAGE).with_window(Window::default());
        let frames = NamedFrameCache::new();
        let cached = FrameHandle::new(Document::parse_html(PAGE), Window::default());
        frames.store("thumb", cached.clone());

        let target = doc.element(doc.query_selector("#target").unwrap()).unwrap();
        let config = CaptureConfig {
            render_name: Some("thumb".into()),
            replace_selector: Some("#slot".into()),
            ..Default::default()
        };
        let cloned = CloneCoordinator::new(&DomCloner, &frames)
            .duplicate(target, &config, Window::default(), &logger())
            .await
            .unwrap();
        assert_eq!(cloned.ownership, FrameOwnership::Borrowed);
        assert!(cloned.frame.same_frame(&cached));
        assert!(cloned.document.query_selector("#slot").is_none());
        assert_eq!(cloned.document.attr(cloned.root, "id"), Some("target"));
    }

    #[tokio::test]
    async fn strict_fast_path_failure_does_not_fall_back() {
        let doc = Document::parse_html(PAGE).with_window(Window::default());
        let frames = NamedFrameCache::new();
        frames.store("thumb", FrameHandle::new(Document::new(), Window::default()));
        let target = doc.element(doc.query_selector("#target").unwrap()).unwrap();
        let mut config = CaptureConfig {
            render_name: Some("thumb".into()),
            replace_selector: Some("#missing".into()),
            ..Default::default()
        };
        let coordinator = CloneCoordinator::new(&DomCloner, &frames);
        let err = coordinator
            .duplicate(target, &config, Window::default(), &logger())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FastClone(_)));

        config.fast_path_policy = FastPathPolicy::FallbackToFull;
        let cloned = coordinator
            .duplicate(target, &config, Window::default(), &logger())
            .await
            .unwrap();
        assert_eq!(cloned.ownership, FrameOwnership::Owned);
    }

    #[tokio::test]
    async fn fast_path_applies_ignore_elements() {
        let doc = Document::parse_html(PAGE).with_window(Window::default());
        let frames = NamedFrameCache::new();
        frames.store("thumb", FrameHandle::new(Document::parse_html(PAGE), Window::default()));
        let target = doc.element(doc.query_selector("#target").unwrap()).unwrap();
        let config = CaptureConfig {
            render_name: Some("thumb".into()),
            replace_selector: Some("body > #slot".into()),
            ignore_elements: Some(IgnoreElements::new(|d, n| d.attr(n, "class") == Some("ad"))),
            ..Default::default()
        };
        let cloned = CloneCoordinator::new(&DomCloner, &frames)
            .duplicate(target, &config, Window::default(), &logger())
            .await
            .unwrap();
        assert_eq!(cloned.ownership, FrameOwnership::Borrowed);
        let text = cloned.document.text_content(cloned.root);
        assert!(text.contains("keep"));
        assert!(!text.contains("ad"));
        assert!(!text.contains("x()"));
    }

    #[tokio::test]
    async fn unparseable_replace_selector_is_rejected() {
        let doc = Document::parse_html(PAGE).with_window(Window::default());
        let target = doc.element(doc.query_selector("#target").unwrap()).unwrap();
        let config = CaptureConfig {
            render_name: Some("thumb".into()),
            replace_selector: Some("#slot >".into()),
            ..Default::default()
        };
        let err = CloneCoordinator::new(&DomCloner, &NamedFrameCache::new())
            .duplicate(target, &config, Window::default(), &logger())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn dead_cached_frame_does_not_qualify() {
        let frames = NamedFrameCache::new();
        let frame = FrameHandle::new(Document::new(), Window::default());
        frames.store("thumb", frame.clone());
        frame.detach();
        let config = CaptureConfig {
            render_name: Some("thumb".into()),
            replace_selector: Some("#slot".into()),
            ..Default::default()
        };
        assert!(CloneCoordinator::new(&DomCloner, &frames).fast_path_frame(&config).is_none());
    }
}
