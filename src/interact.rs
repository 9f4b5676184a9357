//! Pointer input for the drawing canvas.
//!
//! Events arrive in canvas space and are mapped to image space with the
//! current scale before they reach the draft.

use crate::draft::DraftPolygon;
use crate::geometry::{to_image, Point};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Click(Point),
    DoubleClick(Point),
    Move(Point),
    Leave,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InteractionOutcome {
    Ignored,
    PointAdded { count: usize },
    /// The draft can be closed; the form collaborator submits the metadata.
    ReadyToFinalize,
    /// Redraw the scene, then the preview line to this canvas point.
    PreviewMoved(Point),
    PreviewCleared,
}

impl InteractionOutcome {
    pub fn needs_redraw(&self) -> bool {
        !matches!(self, InteractionOutcome::Ignored | InteractionOutcome::ReadyToFinalize)
    }
}

/// Tracks the live pointer for the preview line.
#[derive(Clone, Debug, Default)]
pub struct InteractionController {
    pointer: Option<Point>,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last pointer position in canvas space, while a preview is showing.
    pub fn pointer(&self) -> Option<Point> {
        self.pointer
    }

    pub fn reset(&mut self) {
        self.pointer = None;
    }

    /// Applies one pointer event. `enabled` is false while the view is not
    /// active; every event is then ignored.
    pub fn handle(
        &mut self,
        event: PointerEvent,
        draft: &mut DraftPolygon,
        scale: f64,
        enabled: bool,
    ) -> InteractionOutcome {
        if !enabled || scale.is_nan() || scale <= 0.0 {
            return InteractionOutcome::Ignored;
        }
        match event {
            PointerEvent::Click(at) => {
                if !draft.is_drawing() {
                    return InteractionOutcome::Ignored;
                }
                match draft.add_point(to_image(at, scale)) {
                    Ok(count) => InteractionOutcome::PointAdded { count },
                    Err(_) => InteractionOutcome::Ignored,
                }
            }
            PointerEvent::DoubleClick(_) => {
                if draft.is_ready() {
                    InteractionOutcome::ReadyToFinalize
                } else {
                    InteractionOutcome::Ignored
                }
            }
            PointerEvent::Move(at) => {
                if !draft.is_drawing() || draft.is_empty() {
                    return InteractionOutcome::Ignored;
                }
                self.pointer = Some(at);
                InteractionOutcome::PreviewMoved(at)
            }
            PointerEvent::Leave => match self.pointer.take() {
                Some(_) => InteractionOutcome::PreviewCleared,
                None => InteractionOutcome::Ignored,
            },
        }
    }
}
