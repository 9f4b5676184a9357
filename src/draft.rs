//! In-progress polygon construction.
//!
//! The draft is transient: it is never persisted and is reset on finalize,
//! cancel or clear. Only the interaction layer and the console mutate it.

use crate::geometry::Point;
use crate::zone::{Zone, ZoneCollection, ZoneParams, MIN_ZONE_POINTS};
use crate::{ZoneError, ZoneResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrawingState {
    #[default]
    Idle,
    Drawing,
}

/// Point-by-point polygon builder with an `Idle -> Drawing -> Idle` session.
#[derive(Clone, Debug, Default)]
pub struct DraftPolygon {
    state: DrawingState,
    points: Vec<Point>,
}

impl DraftPolygon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DrawingState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        self.state == DrawingState::Drawing
    }

    /// Image-space points in click order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drawing with enough points to close a polygon.
    pub fn is_ready(&self) -> bool {
        self.is_drawing() && self.points.len() >= MIN_ZONE_POINTS
    }

    /// Opens a drawing session. A baseline must already be on the canvas.
    pub fn start(&mut self, baseline_loaded: bool) -> ZoneResult<()> {
        if !baseline_loaded {
            return Err(ZoneError::NoBaselineImage);
        }
        self.state = DrawingState::Drawing;
        self.points.clear();
        Ok(())
    }

    /// Appends an image-space point; returns the new point count.
    pub fn add_point(&mut self, p: Point) -> ZoneResult<usize> {
        if !self.is_drawing() {
            return Err(ZoneError::NotDrawing);
        }
        self.points.push(p.clamped());
        Ok(self.points.len())
    }

    /// Removes the last point. Empty or idle drafts are left alone.
    pub fn undo(&mut self) -> Option<Point> {
        self.points.pop()
    }

    /// Drops every point but keeps the session open.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Builds the zone the draft would produce without closing the session.
    ///
    /// The console persists this first and only resets the draft once the
    /// remote store has accepted it, so a failed save can be retried.
    pub fn prepare(
        &self,
        params: &ZoneParams,
        existing: &ZoneCollection,
        id: String,
        created_at: String,
    ) -> ZoneResult<Zone> {
        if !self.is_drawing() {
            return Err(ZoneError::NotDrawing);
        }
        Zone::from_draft(&self.points, params, existing, id, created_at)
    }

    /// Validates and closes the session, returning the finished zone.
    ///
    /// On error the points and the `Drawing` state are left untouched.
    pub fn finalize(
        &mut self,
        params: &ZoneParams,
        existing: &ZoneCollection,
        id: String,
        created_at: String,
    ) -> ZoneResult<Zone> {
        let zone = self.prepare(params, existing, id, created_at)?;
        self.reset();
        Ok(zone)
    }

    /// Leaves the session and discards the points.
    pub fn cancel(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.state = DrawingState::Idle;
        self.points.clear();
    }
}
