use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::path::Path;
use tiny_skia::{Color, ColorU8, Paint, Pixmap, PixmapPaint, Rect, Transform};
use usvg::{Options, Tree};

use super::font::FontBook;
use super::parse_hex_color;
use crate::annotations::BoundingBox;

/// Drawing surface for replacement text. Coordinates are image pixels with
/// the origin at the top-left corner.
pub trait Canvas {
    /// Fills `rect` including its right and bottom edges.
    fn fill_rect(&mut self, rect: &BoundingBox, color: &str) -> Result<()>;

    /// Draws one line of text whose ascender line starts at `(x, y)`.
    fn draw_text(&mut self, x: f64, y: f64, text: &str, size: u32, color: &str) -> Result<()>;

    /// Draws the text onto a transparent `buffer`x`buffer` square, rotates it
    /// 90 degrees counter-clockwise and composites it with its top-left
    /// corner at `(x, y)`.
    fn draw_rotated_text(
        &mut self,
        x: f64,
        y: f64,
        buffer: u32,
        text: &str,
        size: u32,
        color: &str,
    ) -> Result<()>;
}

#[derive(Debug)]
pub struct RasterCanvas {
    pixmap: Pixmap,
    fonts: FontBook,
    has_alpha: bool,
}

impl RasterCanvas {
    pub fn open(path: &Path, fonts: FontBook) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to open image: {}", path.display()))?;
        let has_alpha = image.color().has_alpha();
        let mut canvas = Self::from_rgba(image.to_rgba8(), fonts)?;
        canvas.has_alpha = has_alpha;
        Ok(canvas)
    }

    pub fn from_rgba(image: RgbaImage, fonts: FontBook) -> Result<Self> {
        let (width, height) = image.dimensions();
        let mut pixmap =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("image has no pixels"))?;
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }
        Ok(Self {
            pixmap,
            fonts,
            has_alpha: true,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let color = self.pixmap.pixel(x, y)?.demultiply();
        Some([color.red(), color.green(), color.blue(), color.alpha()])
    }

    pub fn to_rgba(&self) -> RgbaImage {
        let mut image = RgbaImage::new(self.width(), self.height());
        for (dst, src) in image.pixels_mut().zip(self.pixmap.pixels()) {
            let color = src.demultiply();
            *dst = image::Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
        }
        image
    }

    /// Writes the image in the format named by the extension. Sources without
    /// an alpha channel, and JPEG targets, are written as RGB.
    pub fn save(&self, path: &Path) -> Result<()> {
        let format = ImageFormat::from_path(path)
            .with_context(|| format!("unsupported image extension: {}", path.display()))?;
        let image = DynamicImage::ImageRgba8(self.to_rgba());
        let image = if !self.has_alpha || format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(image.to_rgb8())
        } else {
            image
        };
        image
            .save_with_format(path, format)
            .with_context(|| format!("failed to write image: {}", path.display()))
    }

    fn text_svg(
        &self,
        (width, height): (u32, u32),
        (x, y): (f64, f64),
        text: &str,
        size: u32,
        color: &str,
    ) -> String {
        let baseline = y + f64::from(self.fonts.ascent()) * f64::from(size);
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><text x="{x}" y="{y}" font-size="{size}" fill="{color}" font-family="{family}" xml:space="preserve">{text}</text></svg>"#,
            w = width,
            h = height,
            x = x,
            y = baseline,
            size = size,
            color = escape_xml(color),
            family = escape_xml(self.fonts.family()),
            text = escape_xml(text)
        )
    }

    fn parse_svg(&self, svg: &str) -> Result<Tree> {
        let options = Options {
            fontdb: self.fonts.database(),
            ..Options::default()
        };
        Tree::from_str(svg, &options).with_context(|| "failed to build text layer")
    }
}

impl Canvas for RasterCanvas {
    fn fill_rect(&mut self, rect: &BoundingBox, color: &str) -> Result<()> {
        let [r, g, b] = parse_hex_color(color)?;
        let area = Rect::from_xywh(
            rect.x() as f32,
            rect.y() as f32,
            (rect.w() + 1.0) as f32,
            (rect.h() + 1.0) as f32,
        )
        .ok_or_else(|| anyhow!("cannot fill box {:?}", rect))?;
        let mut paint = Paint::default();
        paint.set_color(Color::from_rgba8(r, g, b, 255));
        paint.anti_alias = false;
        self.pixmap.fill_rect(area, &paint, Transform::identity(), None);
        Ok(())
    }

    fn draw_text(&mut self, x: f64, y: f64, text: &str, size: u32, color: &str) -> Result<()> {
        let svg = self.text_svg((self.width(), self.height()), (x, y), text, size, color);
        let tree = self.parse_svg(&svg)?;
        resvg::render(&tree, Transform::identity(), &mut self.pixmap.as_mut());
        Ok(())
    }

    fn draw_rotated_text(
        &mut self,
        x: f64,
        y: f64,
        buffer: u32,
        text: &str,
        size: u32,
        color: &str,
    ) -> Result<()> {
        let mut layer = Pixmap::new(buffer, buffer)
            .ok_or_else(|| anyhow!("text buffer of side {} is empty", buffer))?;
        let svg = self.text_svg((buffer, buffer), (0.0, 0.0), text, size, color);
        let tree = self.parse_svg(&svg)?;
        resvg::render(&tree, Transform::identity(), &mut layer.as_mut());

        // (u, v) -> (x + v, y + side - u)
        let side = buffer as f32;
        let rotate = Transform::from_row(0.0, -1.0, 1.0, 0.0, x as f32, y as f32 + side);
        self.pixmap
            .draw_pixmap(0, 0, layer.as_ref(), &PixmapPaint::default(), rotate, None);
        Ok(())
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use usvg::fontdb;

    fn fonts() -> FontBook {
        FontBook::from_database(fontdb::Database::new(), "Test Sans")
    }

    fn tuffy() -> FontBook {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/Tuffy.ttf");
        FontBook::load(&path).unwrap()
    }

    fn white(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]))
    }

    /// Smallest `(min_x, min_y, max_x, max_y)` covering the dark pixels.
    fn ink_bounds(canvas: &RasterCanvas) -> Option<(u32, u32, u32, u32)> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for y in 0..canvas.height() {
            for x in 0..canvas.width() {
                let [r, _, _, _] = canvas.pixel(x, y)?;
                if r >= 128 {
                    continue;
                }
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        bounds
    }

    fn red(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba([200, 0, 0, 255]))
    }

    #[test]
    fn fill_covers_the_inclusive_box() {
        let mut canvas = RasterCanvas::from_rgba(red(40, 30), fonts()).unwrap();
        canvas
            .fill_rect(&BoundingBox::new(5.0, 5.0, 10.0, 4.0).unwrap(), "#ffffff")
            .unwrap();
        assert_eq!(canvas.pixel(5, 5), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(15, 9), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(16, 9), Some([200, 0, 0, 255]));
        assert_eq!(canvas.pixel(15, 10), Some([200, 0, 0, 255]));
        assert_eq!(canvas.pixel(4, 5), Some([200, 0, 0, 255]));
    }

    #[test]
    fn text_without_matching_font_leaves_pixels() {
        let mut canvas = RasterCanvas::from_rgba(red(40, 30), fonts()).unwrap();
        canvas.draw_text(2.0, 2.0, "a < b & c", 12, "#000000").unwrap();
        canvas
            .draw_rotated_text(2.0, 2.0, 20, "vertical", 12, "#000000")
            .unwrap();
        assert_eq!(canvas.pixel(3, 10), Some([200, 0, 0, 255]));
    }

    #[test]
    fn horizontal_text_hangs_below_the_given_point() {
        let mut canvas = RasterCanvas::from_rgba(white(140, 40), tuffy()).unwrap();
        canvas.draw_text(10.0, 10.0, "Tons", 14, "#000000").unwrap();

        let (x0, y0, x1, y1) = ink_bounds(&canvas).unwrap();
        assert!((10..=14).contains(&x0), "left edge {}", x0);
        assert!(x1 < 70, "right edge {}", x1);
        assert!((10..=16).contains(&y0), "top edge {}", y0);
        assert!(y1 <= 28, "bottom edge {}", y1);
    }

    #[test]
    fn rotated_text_reads_bottom_to_top_in_the_left_columns() {
        let mut canvas = RasterCanvas::from_rgba(white(140, 140), tuffy()).unwrap();
        canvas
            .draw_rotated_text(10.0, 10.0, 100, "Tons", 14, "#000000")
            .unwrap();

        let (x0, y0, x1, y1) = ink_bounds(&canvas).unwrap();
        assert!(x0 >= 10 && x1 <= 24, "columns {}..={}", x0, x1);
        assert!(y0 >= 60, "top edge {}", y0);
        assert!((100..=110).contains(&y1), "bottom edge {}", y1);
    }

    #[test]
    fn save_follows_extension_and_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("1.png");
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30])))
            .save(&source)
            .unwrap();

        let mut canvas = RasterCanvas::open(&source, fonts()).unwrap();
        canvas
            .fill_rect(&BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap(), "#ffffff")
            .unwrap();
        let png = dir.path().join("out.png");
        canvas.save(&png).unwrap();
        let reloaded = image::open(&png).unwrap();
        assert!(!reloaded.color().has_alpha());
        assert_eq!(reloaded.to_rgb8().get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(reloaded.to_rgb8().get_pixel(5, 5).0, [10, 20, 30]);

        let jpg = dir.path().join("out.jpg");
        canvas.save(&jpg).unwrap();
        assert_eq!(image::open(&jpg).unwrap().width(), 8);

        assert!(canvas.save(&dir.path().join("out.unknown")).is_err());
    }

    #[test]
    fn open_reports_missing_images() {
        let dir = tempfile::tempdir().unwrap();
        let err = RasterCanvas::open(&dir.path().join("3.png"), fonts()).unwrap_err();
        assert!(err.to_string().contains("failed to open image"));
    }
}
