use anyhow::{anyhow, Context, Result};
use std::path::Path;
use image::RgbaImage;
use tiny_skia::{
    Color, ColorU8, FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint,
    Rect, Stroke, StrokeDash, Transform,
};

use super::{Glyphs, Rgba, StrokeStyle, Surface, TextStyle};
use crate::baseline::BaselineImage;
use crate::geometry::{CanvasSize, Point};

/// Raster surface backed by a tiny-skia pixmap.
///
/// Glyphs are rasterised with the process-wide [`Glyphs`] set, the same one
/// `measure_text` sizes label boxes with.
pub struct PixmapSurface {
    pixmap: Pixmap,
}

impl PixmapSurface {
    pub fn new(size: CanvasSize) -> Result<Self> {
        let pixmap = Pixmap::new(size.width, size.height)
            .ok_or_else(|| anyhow!("cannot allocate {}x{} pixmap", size.width, size.height))?;
        Ok(Self { pixmap })
    }

    /// Straight-alpha color of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some(Rgba::new(c.red(), c.green(), c.blue(), c.alpha()))
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap.encode_png().context("encode canvas as PNG")
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let bytes = self.encode_png()?;
        std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
    }
}

fn paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

fn stroke(style: &StrokeStyle) -> Stroke {
    Stroke {
        width: style.width as f32,
        dash: style
            .dash
            .and_then(|[on, off]| StrokeDash::new(vec![on as f32, off as f32], 0.0)),
        ..Default::default()
    }
}

fn polyline(points: &[Point], closed: bool) -> Option<tiny_skia::Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x as f32, first.y as f32);
    for p in rest {
        pb.line_to(p.x as f32, p.y as f32);
    }
    if closed {
        pb.close();
    }
    pb.finish()
}

impl PixmapSurface {
    /// Straight-alpha copy of a region, for drawing with `image` tooling.
    fn read_patch(&self, x0: u32, y0: u32, width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let c = self
                .pixmap
                .pixel(x0 + x, y0 + y)
                .map(|p| p.demultiply())
                .unwrap_or_else(|| ColorU8::from_rgba(0, 0, 0, 0));
            image::Rgba([c.red(), c.green(), c.blue(), c.alpha()])
        })
    }

    /// Writes back only the pixels that differ from `before`.
    fn write_patch(&mut self, x0: u32, y0: u32, before: &RgbaImage, patch: &RgbaImage) {
        let stride = self.pixmap.width() as usize;
        let pixels = self.pixmap.pixels_mut();
        for ((x, y, px), old) in patch.enumerate_pixels().zip(before.pixels()) {
            if px == old {
                continue;
            }
            let [r, g, b, a] = px.0;
            let idx = (y0 + y) as usize * stride + (x0 + x) as usize;
            if let Some(dst) = pixels.get_mut(idx) {
                *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
            }
        }
    }
}

fn to_pixmap(image: &BaselineImage) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let mut data = image.rgba().as_raw().clone();
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a < 255 {
            for c in &mut px[..3] {
                *c = ((*c as u16 * a + 127) / 255) as u8;
            }
        }
    }
    Pixmap::from_vec(data, size)
}

impl Surface for PixmapSurface {
    fn size(&self) -> CanvasSize {
        CanvasSize::new(self.pixmap.width(), self.pixmap.height())
    }

    fn resize(&mut self, size: CanvasSize) {
        match Pixmap::new(size.width, size.height) {
            Some(pixmap) => self.pixmap = pixmap,
            None => log::error!(
                "cannot resize canvas to {}x{}; keeping {}x{}",
                size.width,
                size.height,
                self.pixmap.width(),
                self.pixmap.height()
            ),
        }
    }

    fn clear(&mut self) {
        self.pixmap.fill(Color::TRANSPARENT);
    }

    fn draw_image(&mut self, image: &BaselineImage, dest: CanvasSize) {
        let Some(src) = to_pixmap(image) else {
            log::warn!("baseline image has no pixels; skipped");
            return;
        };
        let sx = dest.width as f32 / image.width() as f32;
        let sy = dest.height as f32 / image.height() as f32;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..Default::default()
        };
        self.pixmap.draw_pixmap(
            0,
            0,
            src.as_ref(),
            &paint,
            Transform::from_scale(sx, sy),
            None,
        );
    }

    fn fill_polygon(&mut self, points: &[Point], color: Rgba) {
        if let Some(path) = polyline(points, true) {
            self.pixmap.fill_path(
                &path,
                &paint(color),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, style: &StrokeStyle) {
        if let Some(path) = polyline(points, closed) {
            self.pixmap.stroke_path(
                &path,
                &paint(style.color),
                &stroke(style),
                Transform::identity(),
                None,
            );
        }
    }

    fn fill_circle(&mut self, center: Point, radius: f64, fill: Rgba, outline: Option<&StrokeStyle>) {
        let Some(path) = PathBuilder::from_circle(center.x as f32, center.y as f32, radius as f32)
        else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &paint(fill),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
        if let Some(style) = outline {
            self.pixmap.stroke_path(
                &path,
                &paint(style.color),
                &stroke(style),
                Transform::identity(),
                None,
            );
        }
    }

    fn fill_rect(&mut self, origin: Point, width: f64, height: f64, color: Rgba) {
        if let Some(rect) =
            Rect::from_xywh(origin.x as f32, origin.y as f32, width as f32, height as f32)
        {
            self.pixmap
                .fill_rect(rect, &paint(color), Transform::identity(), None);
        }
    }

    fn fill_text(&mut self, text: &str, at: Point, style: &TextStyle) {
        let glyphs = Glyphs::system();
        let (width, height) = glyphs.measure(text, style);
        // glyphs may overhang their advance box
        let pad = style.size.ceil();
        let left = at.x - width / 2.0;
        let top = at.y - height / 2.0;
        let x0 = (left - pad).floor().max(0.0) as u32;
        let y0 = (top - pad).floor().max(0.0) as u32;
        let x1 = ((left + width + pad).ceil().max(0.0) as u32).min(self.pixmap.width());
        let y1 = ((top + height + pad).ceil().max(0.0) as u32).min(self.pixmap.height());
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let before = self.read_patch(x0, y0, x1 - x0, y1 - y0);
        let mut patch = before.clone();
        glyphs.draw(
            &mut patch,
            text,
            (left - x0 as f64).round() as i32,
            (top - y0 as f64).round() as i32,
            style,
        );
        self.write_patch(x0, y0, &before, &patch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{render_scene, Scene};
    use crate::zone::{Zone, ZoneCollection, ZoneParams};
    use image::RgbaImage;

    fn square_zone(color: &str) -> Zone {
        let params = ZoneParams {
            color: color.to_string(),
            ..ZoneParams::named("Square")
        };
        Zone::from_draft(
            &[
                Point::new(100.0, 100.0),
                Point::new(300.0, 100.0),
                Point::new(300.0, 300.0),
                Point::new(100.0, 300.0),
            ],
            &params,
            &ZoneCollection::new(),
            "sq".into(),
            String::new(),
        )
        .unwrap()
    }

    #[test]
    fn baseline_is_stretched_over_canvas() {
        let image = BaselineImage::from_rgba(RgbaImage::from_pixel(
            20,
            10,
            image::Rgba([0, 0, 255, 255]),
        ));
        let mut surface = PixmapSurface::new(CanvasSize::new(1, 1)).unwrap();
        let scene = Scene {
            canvas: CanvasSize::new(40, 20),
            scale: 2.0,
            baseline: Some(&image),
            zones: &[],
            draft: &[],
            show_missing_baseline: false,
        };
        render_scene(&mut surface, &scene);
        assert_eq!(surface.size(), CanvasSize::new(40, 20));
        assert_eq!(surface.pixel(20, 10), Some(Rgba::rgb(0, 0, 255)));
    }

    #[test]
    fn zone_interior_is_translucent_fill() {
        let zones = vec![square_zone("#00FF00")];
        let mut surface = PixmapSurface::new(CanvasSize::new(200, 200)).unwrap();
        let scene = Scene {
            canvas: CanvasSize::new(200, 200),
            scale: 0.5,
            baseline: None,
            zones: &zones,
            draft: &[],
            show_missing_baseline: false,
        };
        render_scene(&mut surface, &scene);
        // inside the polygon, away from the label box at the centroid
        let inside = surface.pixel(60, 60).unwrap();
        assert_eq!((inside.r, inside.g, inside.b), (0, 255, 0));
        assert!(inside.a > 0x30 && inside.a < 0x50, "alpha {}", inside.a);
        // outside untouched
        assert_eq!(surface.pixel(10, 10).unwrap().a, 0);
    }

    #[test]
    fn zone_label_glyphs_are_rasterised() {
        let zone = Zone::from_draft(
            &[
                Point::new(100.0, 100.0),
                Point::new(300.0, 100.0),
                Point::new(300.0, 300.0),
                Point::new(100.0, 300.0),
            ],
            &ZoneParams::named("Gate West"),
            &ZoneCollection::new(),
            "gw".into(),
            String::new(),
        )
        .unwrap();
        let zones = vec![zone];
        let mut surface = PixmapSurface::new(CanvasSize::new(400, 400)).unwrap();
        let scene = Scene {
            canvas: CanvasSize::new(400, 400),
            scale: 1.0,
            baseline: None,
            zones: &zones,
            draft: &[],
            show_missing_baseline: false,
        };
        render_scene(&mut surface, &scene);

        let mut white = 0;
        for y in 180..220 {
            for x in 120..280 {
                let p = surface.pixel(x, y).unwrap();
                if p.r > 200 && p.g > 200 && p.b > 200 && p.a > 200 {
                    white += 1;
                }
            }
        }
        assert!(white > 20, "only {} label pixels", white);
        // the label box is dark where no glyph landed
        let corner = surface.pixel(200, 200 - 8 - 4).unwrap();
        assert!(corner.r < 100, "{:?}", corner);
    }

    #[test]
    fn missing_baseline_overlay_has_visible_text() {
        let mut surface = PixmapSurface::new(CanvasSize::new(1, 1)).unwrap();
        let scene = Scene {
            canvas: CanvasSize::new(400, 200),
            scale: 1.0,
            baseline: None,
            zones: &[],
            draft: &[],
            show_missing_baseline: true,
        };
        render_scene(&mut surface, &scene);
        let lit = (0..400u32)
            .flat_map(|x| (80..120u32).map(move |y| (x, y)))
            .filter(|&(x, y)| surface.pixel(x, y).map_or(false, |p| p.r > 200))
            .count();
        assert!(lit > 50);
    }

    #[test]
    fn snapshot_encodes_png() {
        let surface = PixmapSurface::new(CanvasSize::new(4, 4)).unwrap();
        let png = surface.encode_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
