//! Scene rendering onto an abstract drawing surface.
//!
//! Draw order is fixed: clear, baseline frame, zones in collection order,
//! draft polygon, then the optional error overlay. The renderer never mutates
//! the data it draws; the pointer preview is drawn on top of a finished scene
//! and never stored.

mod display_list;
mod pixmap;
mod text;

pub use display_list::{DisplayList, DrawOp};
pub use pixmap::PixmapSurface;
pub use text::{Glyphs, FONT_ENV};

use serde::{Deserialize, Serialize};

use crate::baseline::BaselineImage;
use crate::geometry::{centroid, to_canvas, CanvasSize, Point};
use crate::zone::{parse_hex_rgb, Zone, DEFAULT_ZONE_COLOR};

pub const ZONE_FILL_ALPHA: u8 = 0x40;
pub const ZONE_STROKE_WIDTH: f64 = 4.0;
pub const DRAFT_POINT_RADIUS: f64 = 8.0;
pub const DRAFT_OUTLINE_WIDTH: f64 = 2.0;
pub const DRAFT_INDEX_OFFSET: f64 = 20.0;
pub const PREVIEW_WIDTH: f64 = 2.0;
pub const PREVIEW_DASH: [f64; 2] = [5.0, 5.0];
pub const LABEL_PADDING: f64 = 5.0;
pub const LABEL_TEXT_HEIGHT: f64 = 16.0;

pub const NO_BASELINE_TITLE: &str = "No Baseline Image Available";
pub const NO_BASELINE_HINT: &str = "Please upload a video and confirm baseline first";

/// Straight RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(0xFF, 0xFF, 0xFF);
    pub const YELLOW: Rgba = Rgba::rgb(0xFF, 0xFF, 0x00);
    /// `rgba(0, 0, 0, 0.7)`
    pub const LABEL_BACKGROUND: Rgba = Rgba::new(0, 0, 0, 179);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xFF)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        parse_hex_rgb(hex).map(|(r, g, b)| Self::rgb(r, g, b))
    }

    /// Zone color, falling back to the default red for malformed values.
    pub fn zone(hex: &str) -> Self {
        Self::from_hex(hex)
            .or_else(|| Self::from_hex(DEFAULT_ZONE_COLOR))
            .unwrap_or(Rgba::rgb(0xFF, 0, 0))
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// CSS `#RRGGBBAA`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: Rgba,
    pub width: f64,
    /// `[on, off]` dash lengths; solid when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash: Option<[f64; 2]>,
}

impl StrokeStyle {
    pub fn solid(color: Rgba, width: f64) -> Self {
        Self {
            color,
            width,
            dash: None,
        }
    }

    pub fn dashed(color: Rgba, width: f64, dash: [f64; 2]) -> Self {
        Self {
            color,
            width,
            dash: Some(dash),
        }
    }
}

/// Centered text. `at` is the middle of the line box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub color: Rgba,
    pub size: f64,
    pub bold: bool,
}

impl TextStyle {
    pub fn zone_label() -> Self {
        Self {
            color: Rgba::WHITE,
            size: 14.0,
            bold: true,
        }
    }

    pub fn point_index() -> Self {
        Self {
            color: Rgba::BLACK,
            size: 12.0,
            bold: true,
        }
    }
}

/// Drawing primitives the renderer needs. All coordinates are canvas space.
pub trait Surface {
    fn size(&self) -> CanvasSize;
    fn resize(&mut self, size: CanvasSize);
    fn clear(&mut self);
    /// Draws `image` stretched over `(0, 0)..dest`.
    fn draw_image(&mut self, image: &BaselineImage, dest: CanvasSize);
    fn fill_polygon(&mut self, points: &[Point], color: Rgba);
    fn stroke_path(&mut self, points: &[Point], closed: bool, style: &StrokeStyle);
    fn fill_circle(&mut self, center: Point, radius: f64, fill: Rgba, outline: Option<&StrokeStyle>);
    fn fill_rect(&mut self, origin: Point, width: f64, height: f64, color: Rgba);
    fn fill_text(&mut self, text: &str, at: Point, style: &TextStyle);

    /// Advance width of `text` in the face raster surfaces draw with.
    fn measure_text(&self, text: &str, style: &TextStyle) -> f64 {
        Glyphs::system().measure(text, style).0
    }
}

/// Everything one frame needs, borrowed from the console.
#[derive(Clone, Copy, Debug)]
pub struct Scene<'a> {
    pub canvas: CanvasSize,
    pub scale: f64,
    pub baseline: Option<&'a BaselineImage>,
    pub zones: &'a [Zone],
    /// Image-space draft points.
    pub draft: &'a [Point],
    /// Set once acquisition has given up.
    pub show_missing_baseline: bool,
}

/// Redraws the full scene.
pub fn render_scene<S: Surface + ?Sized>(surface: &mut S, scene: &Scene<'_>) {
    if surface.size() != scene.canvas {
        surface.resize(scene.canvas);
    }
    surface.clear();
    if let Some(image) = scene.baseline {
        surface.draw_image(image, scene.canvas);
    }
    for zone in scene.zones {
        draw_zone(surface, zone, scene.scale);
    }
    draw_draft(surface, scene.draft, scene.scale);
    if scene.show_missing_baseline {
        draw_missing_baseline(surface, scene.canvas);
    }
}

/// Dashed line from the last draft point to the live pointer (canvas space).
pub fn render_pointer_preview<S: Surface + ?Sized>(surface: &mut S, scene: &Scene<'_>, pointer: Point) {
    let Some(last) = scene.draft.last() else {
        return;
    };
    let from = to_canvas(*last, scene.scale);
    surface.stroke_path(
        &[from, pointer],
        false,
        &StrokeStyle::dashed(Rgba::YELLOW, PREVIEW_WIDTH, PREVIEW_DASH),
    );
}

fn draw_zone<S: Surface + ?Sized>(surface: &mut S, zone: &Zone, scale: f64) {
    if !zone.is_drawable() {
        return;
    }
    let color = Rgba::zone(&zone.color);
    let points: Vec<Point> = zone.coordinates.iter().map(|p| to_canvas(*p, scale)).collect();
    surface.fill_polygon(&points, color.with_alpha(ZONE_FILL_ALPHA));
    surface.stroke_path(&points, true, &StrokeStyle::solid(color, ZONE_STROKE_WIDTH));

    let Some(center) = centroid(&points) else {
        return;
    };
    let label = zone.label();
    let style = TextStyle::zone_label();
    let text_width = surface.measure_text(&label, &style);
    surface.fill_rect(
        Point::new(
            center.x - text_width / 2.0 - LABEL_PADDING,
            center.y - LABEL_TEXT_HEIGHT / 2.0 - LABEL_PADDING,
        ),
        text_width + 2.0 * LABEL_PADDING,
        LABEL_TEXT_HEIGHT + 2.0 * LABEL_PADDING,
        Rgba::LABEL_BACKGROUND,
    );
    surface.fill_text(&label, center, &style);
}

fn draw_draft<S: Surface + ?Sized>(surface: &mut S, draft: &[Point], scale: f64) {
    if draft.is_empty() {
        return;
    }
    let points: Vec<Point> = draft.iter().map(|p| to_canvas(*p, scale)).collect();
    let outline = StrokeStyle::solid(Rgba::BLACK, DRAFT_OUTLINE_WIDTH);
    let index_style = TextStyle::point_index();
    for (i, p) in points.iter().enumerate() {
        surface.fill_circle(*p, DRAFT_POINT_RADIUS, Rgba::YELLOW, Some(&outline));
        surface.fill_text(
            &(i + 1).to_string(),
            Point::new(p.x, p.y - DRAFT_INDEX_OFFSET),
            &index_style,
        );
    }
    if points.len() > 1 {
        surface.stroke_path(&points, false, &StrokeStyle::solid(Rgba::YELLOW, ZONE_STROKE_WIDTH));
    }
    if points.len() >= 3 {
        let closing = [points[points.len() - 1], points[0]];
        surface.stroke_path(
            &closing,
            false,
            &StrokeStyle::dashed(Rgba::YELLOW, PREVIEW_WIDTH, PREVIEW_DASH),
        );
    }
}

fn draw_missing_baseline<S: Surface + ?Sized>(surface: &mut S, canvas: CanvasSize) {
    let w = canvas.width as f64;
    let h = canvas.height as f64;
    surface.fill_rect(Point::new(0.0, 0.0), w, h, Rgba::LABEL_BACKGROUND);
    let title = TextStyle {
        color: Rgba::WHITE,
        size: 18.0,
        bold: true,
    };
    let hint = TextStyle {
        color: Rgba::WHITE,
        size: 14.0,
        bold: false,
    };
    surface.fill_text(NO_BASELINE_TITLE, Point::new(w / 2.0, h / 2.0 - 12.0), &title);
    surface.fill_text(NO_BASELINE_HINT, Point::new(w / 2.0, h / 2.0 + 12.0), &hint);
}
