//! Per-call capture configuration

use crate::dom::{Document, NodeId};
use crate::rendering::RasterSurface;
use crate::resource::ResourceCache;
use crate::Result;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::Arc;

/// The caller's background preference.
///
/// In JSON an absent `backgroundColor` is `Unset`, an explicit `null` is
/// `Transparent` and a string is `Color`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackgroundOption {
    /// Not specified: opaque white
    #[default]
    Unset,
    /// Explicitly transparent
    Transparent,
    /// A CSS color string, parsed when the background is resolved
    Color(String),
}

fn deserialize_background<'de, D>(deserializer: D) -> std::result::Result<BackgroundOption, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<String>::deserialize(deserializer)? {
        Some(s) => BackgroundOption::Color(s),
        None => BackgroundOption::Transparent,
    })
}

/// What to do when the fast path qualifies but the cached frame has no node
/// matching `replace_selector`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FastPathPolicy {
    /// Fail the call
    #[default]
    Strict,
    /// Log and run a full duplication instead
    FallbackToFull,
}

/// Options handed to the resource cache
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceOptions {
    /// Allow cross-origin images to taint the output
    pub allow_taint: bool,
    /// Fetch cross-origin images in credentialed (CORS) mode
    #[serde(rename = "useCORS")]
    pub use_cors: bool,
    /// Proxy endpoint used for cross-origin images when CORS is not used
    pub proxy: Option<String>,
    /// Per-resource timeout; 0 disables it
    #[serde(rename = "imageTimeout")]
    pub image_timeout_ms: u64,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            allow_taint: false,
            use_cors: false,
            proxy: None,
            image_timeout_ms: 15000,
        }
    }
}

/// Predicate deciding which elements are left out of the duplicate
#[derive(Clone)]
pub struct IgnoreElements(Arc<dyn Fn(&Document, NodeId) -> bool + Send + Sync>);

impl IgnoreElements {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Document, NodeId) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn test(&self, document: &Document, id: NodeId) -> bool {
        (self.0)(document, id)
    }
}

impl fmt::Debug for IgnoreElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IgnoreElements(..)")
    }
}

/// Hook invoked with the duplicated document and the duplicated target before
/// it is loaded into its frame
#[derive(Clone)]
pub struct OnClone(Arc<dyn Fn(&mut Document, NodeId) + Send + Sync>);

impl OnClone {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Document, NodeId) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, document: &mut Document, id: NodeId) {
        (self.0)(document, id)
    }
}

impl fmt::Debug for OnClone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OnClone(..)")
    }
}

/// Configuration for a single capture call.
///
/// Every geometric field left as `None` is derived from the target element
/// and its window.
///
/// # Examples
///
/// ```
/// let cfg = rfcapture::CaptureConfig::from_json(r#"{"backgroundColor": null, "scale": 2}"#).unwrap();
/// assert_eq!(cfg.background_color, rfcapture::BackgroundOption::Transparent);
/// assert!(cfg.remove_container);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Existing resource cache to reuse instead of creating one for the call
    #[serde(skip)]
    pub cache: Option<Arc<ResourceCache>>,
    #[serde(skip)]
    pub ignore_elements: Option<IgnoreElements>,
    #[serde(skip)]
    pub on_clone: Option<OnClone>,
    #[serde(deserialize_with = "deserialize_background")]
    pub background_color: BackgroundOption,
    pub foreign_object_rendering: bool,
    pub logging: bool,
    pub remove_container: bool,
    /// Name under which the hosting frame is kept for later calls
    pub render_name: Option<String>,
    /// Selector of the node to swap out when reusing a named frame
    pub replace_selector: Option<String>,
    pub fast_path_policy: FastPathPolicy,
    /// Surface to draw into instead of allocating a new one
    #[serde(skip)]
    pub canvas: Option<RasterSurface>,
    pub scale: Option<f32>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    pub scroll_x: Option<f64>,
    pub scroll_y: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    #[serde(flatten)]
    pub resources: ResourceOptions,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cache: None,
            ignore_elements: None,
            on_clone: None,
            background_color: BackgroundOption::Unset,
            foreign_object_rendering: false,
            logging: true,
            remove_container: true,
            render_name: None,
            replace_selector: None,
            fast_path_policy: FastPathPolicy::Strict,
            canvas: None,
            scale: None,
            window_width: None,
            window_height: None,
            scroll_x: None,
            scroll_y: None,
            x: None,
            y: None,
            width: None,
            height: None,
            resources: ResourceOptions::default(),
        }
    }
}

impl CaptureConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
