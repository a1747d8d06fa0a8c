//! Effective background color for a capture.
//!
//! When the whole document is captured, the document's own background takes
//! priority over the caller's option: root, then body, then the option.
//! Any other element just uses the option.

use crate::color::{Color, TRANSPARENT};
use crate::config::BackgroundOption;
use crate::Result;

/// The background implied by the caller's option alone
pub fn base_default(option: &BackgroundOption) -> Result<Color> {
    match option {
        BackgroundOption::Color(text) => Color::parse(text),
        BackgroundOption::Transparent => Ok(TRANSPARENT),
        BackgroundOption::Unset => Ok(Color::WHITE),
    }
}

pub fn resolve(
    is_document_root: bool,
    root_background: Color,
    body_background: Color,
    option: &BackgroundOption,
) -> Result<Color> {
    if !is_document_root {
        return base_default(option);
    }
    if !root_background.is_transparent() {
        return Ok(root_background);
    }
    if !body_background.is_transparent() {
        return Ok(body_background);
    }
    base_default(option)
}
