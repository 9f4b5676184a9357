//! Image-space / canvas-space coordinate math.
//!
//! Zones are stored in image space (unscaled pixels of the baseline frame).
//! The canvas shows the frame shrunk by a single `scale` factor, recomputed
//! only when a new baseline is loaded, so one drawing session always maps
//! through the same scale.

use serde::{Deserialize, Serialize};

/// A point in pixel coordinates. Image space unless a function says otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Finite and non-negative on both axes.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x >= 0.0 && self.y >= 0.0
    }

    /// Clamps into the valid domain. Non-finite components collapse to 0.
    pub fn clamped(self) -> Self {
        let fix = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
        Self {
            x: fix(self.x),
            y: fix(self.y),
        }
    }

    pub fn approx_eq(&self, other: &Point, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

/// Maps an image-space point onto the displayed canvas.
pub fn to_canvas(p: Point, scale: f64) -> Point {
    Point {
        x: p.x * scale,
        y: p.y * scale,
    }
}

/// Maps a canvas point back into image space. `scale` must be > 0.
pub fn to_image(p: Point, scale: f64) -> Point {
    Point {
        x: p.x / scale,
        y: p.y / scale,
    }
}

/// Canvas dimensions in whole pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Fits an image of `width`x`height` inside `bounds` without upscaling.
    ///
    /// Returns the canvas size and the scale that produced it.
    pub fn fit(width: u32, height: u32, bounds: CanvasSize) -> (Self, f64) {
        let scale = fit_scale(width, height, bounds.width, bounds.height);
        let scaled = |v: u32| ((v as f64 * scale).floor() as u32).max(1);
        (
            Self {
                width: scaled(width),
                height: scaled(height),
            },
            scale,
        )
    }
}

/// `min(max_width / width, max_height / height, 1)`.
pub fn fit_scale(width: u32, height: u32, max_width: u32, max_height: u32) -> f64 {
    if width == 0 || height == 0 {
        return 1.0;
    }
    let sx = max_width as f64 / width as f64;
    let sy = max_height as f64 / height as f64;
    sx.min(sy).min(1.0)
}

/// Arithmetic mean of the vertices. Used as the label anchor.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Shoelace area of the closed polygon.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        sum += points[i].x * points[j].y;
        sum -= points[j].x * points[i].y;
    }
    sum.abs() / 2.0
}
