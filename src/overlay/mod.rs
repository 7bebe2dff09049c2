mod canvas;
mod font;
mod render;

use anyhow::{Result, anyhow};

pub use canvas::{Canvas, RasterCanvas};
pub use font::FontBook;
pub use render::{font_size, replace_text};

pub const DEFAULT_FILL_COLOR: &str = "#ffffff";
pub const DEFAULT_TEXT_COLOR: &str = "#000000";
pub const DEFAULT_FONT_SCALE: f64 = 0.7;

/// Colours and sizing used when a box is erased and redrawn.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub fill_color: String,
    pub text_color: String,
    pub font_scale: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fill_color: DEFAULT_FILL_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            font_scale: DEFAULT_FONT_SCALE,
        }
    }
}

impl OverlayStyle {
    pub fn new(fill_color: &str, text_color: &str, font_scale: f64) -> Result<Self> {
        parse_hex_color(fill_color)?;
        parse_hex_color(text_color)?;
        if !font_scale.is_finite() || font_scale <= 0.0 {
            return Err(anyhow!("font scale must be a positive number, got {}", font_scale));
        }
        Ok(Self {
            fill_color: fill_color.trim().to_string(),
            text_color: text_color.trim().to_string(),
            font_scale,
        })
    }
}

/// Parses `#rgb` or `#rrggbb`.
pub(crate) fn parse_hex_color(value: &str) -> Result<[u8; 3]> {
    let hex = value
        .trim()
        .strip_prefix('#')
        .ok_or_else(|| anyhow!("color '{}' must start with '#'", value))?;
    let channel = |digits: &str| {
        u8::from_str_radix(digits, 16).map_err(|_| anyhow!("invalid color '{}'", value))
    };
    match hex.len() {
        3 if hex.is_ascii() => {
            let mut out = [0u8; 3];
            for (slot, idx) in out.iter_mut().zip(0..3) {
                let digit = channel(&hex[idx..idx + 1])?;
                *slot = digit * 17;
            }
            Ok(out)
        }
        6 if hex.is_ascii() => Ok([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        ]),
        _ => Err(anyhow!("invalid color '{}'", value)),
    }
}
