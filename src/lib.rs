//! Zone Console
//!
//! Client-side orchestration and rendering for a video motion-detection and
//! beam-control backend.
//!
//! # Architecture
//!
//! The operator draws polygonal detection zones over a baseline frame taken
//! from an uploaded video. The console keeps three copies of the zone set in
//! agreement:
//!
//! 1. **Remote**: the backend is authoritative. Creates and deletes go there
//!    first and only touch local state once acknowledged.
//! 2. **Cache**: a local key/value entry used when the backend is unreachable.
//!    Cached zones the backend no longer knows about are pruned on load.
//! 3. **Memory**: the working set the renderer draws, in collection order.
//!
//! Everything runs on one logical thread. Image decoding happens on a worker
//! and is delivered over a channel that the console drains on `tick`.
//!
//! # Module Structure
//!
//! - `geometry`: image/canvas coordinate transform
//! - `zone`, `draft`: zone entity, collection, and the polygon draft builder
//! - `render`: drawing surfaces and the scene renderer
//! - `store`: remote/cache reconciliation, export and import
//! - `retry`, `schedule`, `lifecycle`: retry budget, timers, view state
//! - `baseline`: baseline image acquisition
//! - `interact`: pointer event handling
//! - `api`: HTTP client for the backend
//! - `beam`: stream and beam control with status polling
//! - `console`: the top-level context object
//! - `config`: file + environment configuration

use chrono::{SecondsFormat, Utc};

pub mod api;
pub mod baseline;
pub mod beam;
pub mod config;
pub mod console;
pub mod draft;
pub mod geometry;
pub mod interact;
pub mod lifecycle;
pub mod render;
pub mod retry;
pub mod schedule;
pub mod store;
pub mod zone;

pub use api::ApiClient;
pub use baseline::{BaselineEvent, BaselineImage, ImageSource};
pub use beam::{BeamBackend, BeamMonitor};
pub use config::ConsoleConfig;
pub use console::ZoneConsole;
pub use draft::{DraftPolygon, DrawingState};
pub use geometry::{to_canvas, to_image, CanvasSize, Point};
pub use render::{render_pointer_preview, render_scene, DisplayList, PixmapSurface, Scene, Surface};
pub use retry::{RetryDecision, RetryPolicy};
pub use store::{
    ExportedConfig, InMemoryZoneCache, InMemoryZoneRemote, SqliteZoneCache, ZoneCache, ZoneRemote,
    ZoneStore,
};
pub use zone::{Zone, ZoneCollection, ZoneParams};

// -------------------- Errors --------------------

/// Failures surfaced to the operator.
///
/// Local validation errors are returned immediately and never retried.
/// Remote failures carry the transport detail for logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZoneError {
    NoBaselineImage,
    InsufficientPoints { have: usize },
    DuplicateName(String),
    EmptyName,
    NotDrawing,
    RemoteSaveFailed(String),
    RemoteDeleteFailed(String),
    InvalidImportFormat(String),
    ImageDecodeFailed(String),
    NetworkUnreachable(String),
    /// Another create or delete is still in flight.
    Busy,
    NotSupported(&'static str),
}

impl ZoneError {
    /// Stable identifier for logs and CLI exit messages.
    pub fn code(&self) -> &'static str {
        match self {
            ZoneError::NoBaselineImage => "NO_BASELINE_IMAGE",
            ZoneError::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            ZoneError::DuplicateName(_) => "DUPLICATE_NAME",
            ZoneError::EmptyName => "EMPTY_NAME",
            ZoneError::NotDrawing => "NOT_DRAWING",
            ZoneError::RemoteSaveFailed(_) => "REMOTE_SAVE_FAILED",
            ZoneError::RemoteDeleteFailed(_) => "REMOTE_DELETE_FAILED",
            ZoneError::InvalidImportFormat(_) => "INVALID_IMPORT_FORMAT",
            ZoneError::ImageDecodeFailed(_) => "IMAGE_DECODE_FAILED",
            ZoneError::NetworkUnreachable(_) => "NETWORK_UNREACHABLE",
            ZoneError::Busy => "BUSY",
            ZoneError::NotSupported(_) => "NOT_SUPPORTED",
        }
    }

    /// True for errors raised by local validation rather than I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ZoneError::NoBaselineImage
                | ZoneError::InsufficientPoints { .. }
                | ZoneError::DuplicateName(_)
                | ZoneError::EmptyName
                | ZoneError::NotDrawing
                | ZoneError::InvalidImportFormat(_)
        )
    }
}

impl std::fmt::Display for ZoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.code();
        match self {
            ZoneError::NoBaselineImage => {
                write!(f, "{}: please load a baseline image first", code)
            }
            ZoneError::InsufficientPoints { have } => write!(
                f,
                "{}: a zone needs at least {} points (have {})",
                code,
                zone::MIN_ZONE_POINTS,
                have
            ),
            ZoneError::DuplicateName(name) => {
                write!(f, "{}: a zone named '{}' already exists", code, name)
            }
            ZoneError::EmptyName => write!(f, "{}: zone name must not be empty", code),
            ZoneError::NotDrawing => write!(f, "{}: no drawing session is active", code),
            ZoneError::RemoteSaveFailed(detail) => {
                write!(f, "{}: failed to save zone: {}", code, detail)
            }
            ZoneError::RemoteDeleteFailed(detail) => {
                write!(f, "{}: failed to delete zone: {}", code, detail)
            }
            ZoneError::InvalidImportFormat(detail) => {
                write!(f, "{}: invalid zone configuration: {}", code, detail)
            }
            ZoneError::ImageDecodeFailed(detail) => {
                write!(f, "{}: baseline image could not be decoded: {}", code, detail)
            }
            ZoneError::NetworkUnreachable(detail) => {
                write!(f, "{}: backend unreachable: {}", code, detail)
            }
            ZoneError::Busy => write!(f, "{}: another zone operation is in progress", code),
            ZoneError::NotSupported(what) => write!(f, "{}: {} is not supported", code, what),
        }
    }
}

impl std::error::Error for ZoneError {}

pub type ZoneResult<T> = std::result::Result<T, ZoneError>;

// -------------------- Time --------------------

/// Current UTC time as RFC 3339 with millisecond precision
/// (`2026-01-01T12:00:00.000Z`).
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_code() {
        let err = ZoneError::InsufficientPoints { have: 2 };
        assert_eq!(
            err.to_string(),
            "INSUFFICIENT_POINTS: a zone needs at least 3 points (have 2)"
        );
        assert!(err.is_validation());
        assert!(!ZoneError::RemoteSaveFailed("500".into()).is_validation());
    }

    #[test]
    fn zone_error_converts_into_anyhow() {
        fn fails() -> anyhow::Result<()> {
            Err(ZoneError::Busy)?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert_eq!(err.downcast_ref::<ZoneError>(), Some(&ZoneError::Busy));
    }

    #[test]
    fn timestamps_are_utc_millis() {
        let ts = now_iso8601();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        assert_eq!(ts.len(), "2026-01-01T00:00:00.000Z".len());
    }
}
