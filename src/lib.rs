//! RFox Capture
//!
//! Renders an element of an in-memory document into a raster image, the way
//! a page screenshots a part of itself without a server round trip.
//!
//! # Features
//!
//! - **Two backends**: SVG `<foreignObject>` serialization or a computed-style
//!   canvas painter, chosen per call
//! - **Frame reuse**: a named frame can be kept between calls and patched in
//!   place instead of duplicating the whole document again
//! - **Scoped state**: every call gets its own logger and resource cache,
//!   released when the call ends whatever the outcome
//! - **Resource policy**: cross-origin images are blocked unless the caller
//!   allows tainting, credentialed fetches or a proxy (`http` feature)
//!
//! # Example
//!
//! ```no_run
//! use rfcapture::{CaptureConfig, Capturer, Document, Window};
//!
//! # async fn run() -> rfcapture::Result<()> {
//! let doc = Document::parse_html("<html><body><p id=\"hello\">Hello</p></body></html>")
//!     .with_window(Window { width: 800, height: 600, ..Default::default() });
//! let hello = doc.element(doc.query_selector("#hello").unwrap()).unwrap();
//!
//! let config = CaptureConfig {
//!     scale: Some(2.0),
//!     ..Default::default()
//! };
//! let png = Capturer::new().render(hello, config).await?.to_png()?;
//! std::fs::write("hello.png", png)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod color;
pub mod config;
pub mod dom;

// Geometry of the capture
pub mod bounds;

// Per-call identity, logging and resource scoping
pub mod instance;
pub mod resource;

// Offscreen frames and document duplication
pub mod clone;
pub mod frame;

pub mod background;
pub mod rendering;
pub mod teardown;

pub mod pipeline;

pub use bounds::{Bounds, BoundsResolver, CaptureRegion, StyleBoundsResolver};
pub use clone::{ClonedDocument, DocumentCloner, DomCloner, FrameOwnership};
pub use color::{Color, TRANSPARENT};
pub use config::{BackgroundOption, CaptureConfig, FastPathPolicy, IgnoreElements, OnClone, ResourceOptions};
pub use dom::{Document, Element, NodeId, Window};
pub use frame::{FrameHandle, NamedFrameCache};
pub use instance::{InstanceId, InstanceRegistry};
pub use pipeline::Capturer;
pub use rendering::{BackendKind, RasterSurface, RenderDispatcher};
pub use resource::{Fetcher, ResourceCache};

#[cfg(feature = "http")]
pub use resource::HttpFetcher;
