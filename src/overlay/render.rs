use anyhow::Result;
use tracing::debug;

use super::OverlayStyle;
use super::canvas::Canvas;
use crate::annotations::BoundingBox;

/// Font size for a box extent: `floor(extent * scale)`.
pub fn font_size(extent: f64, scale: f64) -> u32 {
    // 1e-9 keeps 20 * 0.7 at 14 despite binary rounding
    let size = (extent * scale + 1e-9).floor();
    if size <= 0.0 { 0 } else { size as u32 }
}

/// Erases `bbox` and draws `text` in it. Wide boxes get horizontal text sized
/// from the height; tall or square boxes get text rotated counter-clockwise,
/// sized from the width.
pub fn replace_text<C: Canvas + ?Sized>(
    canvas: &mut C,
    style: &OverlayStyle,
    bbox: &BoundingBox,
    text: &str,
) -> Result<()> {
    bbox.validate()?;
    canvas.fill_rect(bbox, &style.fill_color)?;

    if bbox.is_horizontal() {
        let size = font_size(bbox.h(), style.font_scale);
        if size < 1 {
            debug!("box {:?} too small for text {:?}", bbox, text);
            return Ok(());
        }
        canvas.draw_text(bbox.x(), bbox.y(), text, size, &style.text_color)
    } else {
        let size = font_size(bbox.w(), style.font_scale);
        let side = bbox.h().floor();
        if size < 1 || side < 1.0 {
            debug!("box {:?} too small for text {:?}", bbox, text);
            return Ok(());
        }
        canvas.draw_rotated_text(
            bbox.x(),
            bbox.y(),
            side as u32,
            text,
            size,
            &style.text_color,
        )
    }
}
