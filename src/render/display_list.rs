use serde::{Deserialize, Serialize};

use super::{Rgba, StrokeStyle, Surface, TextStyle};
use crate::baseline::BaselineImage;
use crate::geometry::{CanvasSize, Point};

/// One recorded drawing call, tagged for JSON consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    Clear,
    Image {
        source_width: u32,
        source_height: u32,
        width: u32,
        height: u32,
    },
    FillPolygon {
        points: Vec<Point>,
        color: Rgba,
    },
    StrokePath {
        points: Vec<Point>,
        closed: bool,
        style: StrokeStyle,
    },
    FillCircle {
        center: Point,
        radius: f64,
        fill: Rgba,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outline: Option<StrokeStyle>,
    },
    FillRect {
        origin: Point,
        width: f64,
        height: f64,
        color: Rgba,
    },
    FillText {
        text: String,
        at: Point,
        style: TextStyle,
    },
}

/// Surface that records drawing calls instead of rasterising them.
///
/// `clear` drops everything recorded so far, so after a full render the list
/// holds exactly one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayList {
    size: CanvasSize,
    ops: Vec<DrawOp>,
}

impl DisplayList {
    pub fn new(size: CanvasSize) -> Self {
        Self {
            size,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Surface for DisplayList {
    fn size(&self) -> CanvasSize {
        self.size
    }

    fn resize(&mut self, size: CanvasSize) {
        self.size = size;
        self.ops.clear();
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear);
    }

    fn draw_image(&mut self, image: &BaselineImage, dest: CanvasSize) {
        self.ops.push(DrawOp::Image {
            source_width: image.width(),
            source_height: image.height(),
            width: dest.width,
            height: dest.height,
        });
    }

    fn fill_polygon(&mut self, points: &[Point], color: Rgba) {
        self.ops.push(DrawOp::FillPolygon {
            points: points.to_vec(),
            color,
        });
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, style: &StrokeStyle) {
        self.ops.push(DrawOp::StrokePath {
            points: points.to_vec(),
            closed,
            style: style.clone(),
        });
    }

    fn fill_circle(&mut self, center: Point, radius: f64, fill: Rgba, outline: Option<&StrokeStyle>) {
        self.ops.push(DrawOp::FillCircle {
            center,
            radius,
            fill,
            outline: outline.cloned(),
        });
    }

    fn fill_rect(&mut self, origin: Point, width: f64, height: f64, color: Rgba) {
        self.ops.push(DrawOp::FillRect {
            origin,
            width,
            height,
            color,
        });
    }

    fn fill_text(&mut self, text: &str, at: Point, style: &TextStyle) {
        self.ops.push(DrawOp::FillText {
            text: text.to_string(),
            at,
            style: style.clone(),
        });
    }
}
