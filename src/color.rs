//! RGBA color values and a small CSS color parser.
//!
//! Supports `transparent`, a handful of named colors, `#rgb`, `#rgba`,
//! `#rrggbb`, `#rrggbbaa` and the `rgb()` / `rgba()` functional forms with
//! either comma or space separated arguments.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An 8-bit per channel, non-premultiplied RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Fully transparent sentinel
pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// A color is transparent when its alpha channel is zero, whatever its RGB.
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Parse a CSS color value
    pub fn parse(text: &str) -> Result<Self> {
        let s = text.trim().to_ascii_lowercase();
        if s.is_empty() {
            return Err(Error::InvalidColor("empty color value".into()));
        }
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| Error::InvalidColor(text.to_string()));
        }
        if let Some(args) = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return parse_rgb_args(args).ok_or_else(|| Error::InvalidColor(text.to_string()));
        }
        named(&s).ok_or_else(|| Error::InvalidColor(text.to_string()))
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Color::parse(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
        } else {
            let alpha = self.a as f32 / 255.0;
            write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, (alpha * 1000.0).round() / 1000.0)
        }
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some(Color::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
        4 => Some(Color::rgba(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
        6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

fn parse_rgb_args(args: &str) -> Option<Color> {
    let parts: Vec<&str> = args
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |p: &str| -> Option<u8> {
        if let Some(pct) = p.strip_suffix('%') {
            let v: f32 = pct.parse().ok()?;
            Some((v.clamp(0.0, 100.0) * 2.55).round() as u8)
        } else {
            let v: f32 = p.parse().ok()?;
            Some(v.clamp(0.0, 255.0).round() as u8)
        }
    };
    let alpha = match parts.get(3) {
        None => 255,
        Some(p) => {
            let v: f32 = match p.strip_suffix('%') {
                Some(pct) => pct.parse::<f32>().ok()? / 100.0,
                None => p.parse().ok()?,
            };
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
    };
    Some(Color::rgba(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha))
}

fn named(name: &str) -> Option<Color> {
    let c = match name {
        "transparent" => TRANSPARENT,
        "white" => Color::WHITE,
        "black" => Color::BLACK,
        "red" => Color::rgb(255, 0, 0),
        "green" => Color::rgb(0, 128, 0),
        "lime" => Color::rgb(0, 255, 0),
        "blue" => Color::rgb(0, 0, 255),
        "yellow" => Color::rgb(255, 255, 0),
        "cyan" | "aqua" => Color::rgb(0, 255, 255),
        "magenta" | "fuchsia" => Color::rgb(255, 0, 255),
        "gray" | "grey" => Color::rgb(128, 128, 128),
        "silver" => Color::rgb(192, 192, 192),
        "orange" => Color::rgb(255, 165, 0),
        "purple" => Color::rgb(128, 0, 128),
        "navy" => Color::rgb(0, 0, 128),
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(Color::parse("#fff").unwrap(), Color::WHITE);
        assert_eq!(Color::parse("#ff000080").unwrap(), Color::rgba(255, 0, 0, 128));
        assert_eq!(Color::parse("#0A141E").unwrap(), Color::rgb(10, 20, 30));
        assert!(Color::parse("#12345").is_err());
    }

    #[test]
    fn parses_functional_forms() {
        assert_eq!(Color::parse("rgb(10,20,30)").unwrap(), Color::rgb(10, 20, 30));
        assert_eq!(Color::parse("rgba(0, 0, 0, 0)").unwrap(), TRANSPARENT);
        assert_eq!(Color::parse("rgb(255 0 0 / 50%)").unwrap(), Color::rgba(255, 0, 0, 128));
    }

    #[test]
    fn transparent_ignores_rgb() {
        assert!(Color::parse("transparent").unwrap().is_transparent());
        assert!(Color::rgba(12, 34, 56, 0).is_transparent());
        assert!(!Color::parse("red").unwrap().is_transparent());
    }

    #[test]
    fn display_matches_css() {
        assert_eq!(Color::rgb(10, 20, 30).to_string(), "rgb(10, 20, 30)");
        assert_eq!(TRANSPARENT.to_string(), "rgba(0, 0, 0, 0)");
    }
}
