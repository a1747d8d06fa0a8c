//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing an element
#[derive(Error, Debug)]
pub enum Error {
    /// The target element is not attached to a document, or the document has no window
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The fast path qualified but re-attaching the element in the cached frame failed
    #[error("Fast clone failed: {0}")]
    FastClone(String),

    /// No duplicated node corresponding to the target element could be found
    #[error("Unable to find element in cloned document: {0}")]
    CloneResolution(String),

    /// A rendering backend failed (resource fetch, timeout or drawing)
    #[error("Rendering failed: {0}")]
    BackendRender(String),

    /// A color value could not be parsed
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// A resource could not be resolved through the resource cache
    #[error("Resource error: {0}")]
    Resource(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::BackendRender(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(Error::Precondition("x".into()).to_string().starts_with("Precondition failed:"));
        assert!(Error::FastClone("x".into()).to_string().starts_with("Fast clone failed:"));
        assert!(Error::BackendRender("x".into()).to_string().starts_with("Rendering failed:"));
    }

    #[test]
    fn json_errors_become_config_errors() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Config(_)));
    }
}
