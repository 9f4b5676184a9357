//! Baseline image acquisition.
//!
//! The baseline is the frame zones are drawn over. Its source is resolved
//! from the last known baseline (set by upload/confirm events) and then from
//! the display element's current source. Fetch and decode run through an
//! [`ImageLoader`]; results come back tagged with a ticket so a late answer
//! to a superseded request is dropped. Failures consume a bounded
//! [`RetryPolicy`]; once exhausted the controller stays in the error state
//! until the budget is reset by view activation or a new baseline event.

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use std::io::Read;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::geometry::CanvasSize;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::ZoneError;

/// Largest baseline frame accepted over HTTP.
pub const MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

/// Decoded baseline frame, always RGBA8.
#[derive(Clone, PartialEq)]
pub struct BaselineImage {
    rgba: RgbaImage,
}

impl std::fmt::Debug for BaselineImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaselineImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl BaselineImage {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode baseline image")?;
        let rgba = image.into_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(anyhow!("baseline image has zero size"));
        }
        Ok(Self { rgba })
    }

    pub fn from_rgba(rgba: RgbaImage) -> Self {
        Self { rgba }
    }

    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    pub fn height(&self) -> u32 {
        self.rgba.height()
    }

    pub fn rgba(&self) -> &RgbaImage {
        &self.rgba
    }
}

/// Where a baseline frame can be read from.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageSource {
    Url(String),
    File(PathBuf),
    /// Bytes already in memory, e.g. a freshly uploaded first frame.
    Bytes(Arc<Vec<u8>>),
}

impl ImageSource {
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::File(path) => path.display().to_string(),
            ImageSource::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }

    /// Reads the raw (still encoded) image bytes.
    pub fn read(&self, agent: &ureq::Agent) -> std::result::Result<Vec<u8>, ZoneError> {
        match self {
            ImageSource::Url(url) => fetch_url(agent, url)
                .map_err(|err| ZoneError::NetworkUnreachable(format!("{:#}", err))),
            ImageSource::File(path) => std::fs::read(path)
                .map_err(|err| ZoneError::ImageDecodeFailed(format!("{}: {}", path.display(), err))),
            ImageSource::Bytes(bytes) => Ok(bytes.as_ref().clone()),
        }
    }

    /// Reads and decodes in one step.
    pub fn load(&self, agent: &ureq::Agent) -> std::result::Result<BaselineImage, ZoneError> {
        let bytes = self.read(agent)?;
        BaselineImage::decode(&bytes).map_err(|err| ZoneError::ImageDecodeFailed(format!("{:#}", err)))
    }
}

fn fetch_url(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch baseline image from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_IMAGE_BYTES + 1)
        .read_to_end(&mut bytes)
        .context("read baseline image")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty baseline image"));
    }
    if bytes.len() as u64 > MAX_IMAGE_BYTES {
        return Err(anyhow!("baseline image exceeds {} bytes", MAX_IMAGE_BYTES));
    }
    Ok(bytes)
}

/// Announcements from whatever changes the baseline (upload, confirm).
#[derive(Clone, Debug, PartialEq)]
pub enum BaselineEvent {
    SourceChanged(ImageSource),
    SourceCleared,
}

/// Creates the channel the console drains on every tick.
pub fn baseline_channel() -> (Sender<BaselineEvent>, Receiver<BaselineEvent>) {
    mpsc::channel()
}

/// Candidate sources in priority order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaselineSources {
    /// Last baseline announced through a [`BaselineEvent`].
    pub cached: Option<ImageSource>,
    /// What the baseline display element currently shows.
    pub element: Option<ImageSource>,
}

impl BaselineSources {
    pub fn resolve(&self) -> Option<&ImageSource> {
        self.cached.as_ref().or(self.element.as_ref())
    }
}

#[derive(Debug)]
pub struct LoadResult {
    pub ticket: u64,
    pub outcome: std::result::Result<BaselineImage, ZoneError>,
}

/// Fetches and decodes images off the caller's thread (or pretends to).
pub trait ImageLoader {
    fn request(&mut self, ticket: u64, source: ImageSource);
    /// Non-blocking; returns one finished load if any.
    fn poll(&mut self) -> Option<LoadResult>;
}

/// One worker thread per request, results over a channel.
pub struct ThreadedImageLoader {
    agent: ureq::Agent,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
}

impl ThreadedImageLoader {
    pub fn new(agent: ureq::Agent) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { agent, tx, rx }
    }
}

impl ImageLoader for ThreadedImageLoader {
    fn request(&mut self, ticket: u64, source: ImageSource) {
        let agent = self.agent.clone();
        let tx = self.tx.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("baseline-load-{}", ticket))
            .spawn(move || {
                let outcome = source.load(&agent);
                // receiver gone means the console shut down
                let _ = tx.send(LoadResult { ticket, outcome });
            });
        if let Err(err) = spawned {
            log::error!("failed to spawn baseline loader: {}", err);
            let _ = self.tx.send(LoadResult {
                ticket,
                outcome: Err(ZoneError::ImageDecodeFailed(err.to_string())),
            });
        }
    }

    fn poll(&mut self) -> Option<LoadResult> {
        self.rx.try_recv().ok()
    }
}

/// Loads synchronously inside `request` and hands the result out on the
/// next `poll`. Used by one-shot CLI commands.
pub struct InlineImageLoader {
    agent: ureq::Agent,
    ready: Vec<LoadResult>,
}

impl InlineImageLoader {
    pub fn new(agent: ureq::Agent) -> Self {
        Self {
            agent,
            ready: Vec::new(),
        }
    }
}

impl ImageLoader for InlineImageLoader {
    fn request(&mut self, ticket: u64, source: ImageSource) {
        let outcome = source.load(&self.agent);
        self.ready.push(LoadResult { ticket, outcome });
    }

    fn poll(&mut self) -> Option<LoadResult> {
        if self.ready.is_empty() {
            None
        } else {
            Some(self.ready.remove(0))
        }
    }
}

/// What the owner should do after driving the controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AcquisitionStep {
    /// A load is in flight; keep polling.
    Pending,
    Loaded { canvas: CanvasSize, scale: f64 },
    /// Schedule another `attempt` after the delay.
    RetryAfter(Duration),
    /// Budget spent; show the persistent error until reset.
    Exhausted,
}

pub struct AcquisitionController<L> {
    loader: L,
    sources: BaselineSources,
    policy: RetryPolicy,
    bounds: CanvasSize,
    image: Option<BaselineImage>,
    canvas: CanvasSize,
    scale: f64,
    exhausted: bool,
    next_ticket: u64,
    in_flight: Option<u64>,
}

impl<L: ImageLoader> AcquisitionController<L> {
    pub fn new(loader: L, policy: RetryPolicy, bounds: CanvasSize) -> Self {
        Self {
            loader,
            sources: BaselineSources::default(),
            policy,
            bounds,
            image: None,
            canvas: bounds,
            scale: 1.0,
            exhausted: false,
            next_ticket: 0,
            in_flight: None,
        }
    }

    pub fn image(&self) -> Option<&BaselineImage> {
        self.image.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Failed attempts since the last reset.
    pub fn retry_count(&self) -> u32 {
        self.policy.failures()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn sources(&self) -> &BaselineSources {
        &self.sources
    }

    pub fn set_element_source(&mut self, source: Option<ImageSource>) {
        self.sources.element = source;
    }

    /// Gives the full retry budget back and leaves the error state.
    pub fn reset_budget(&mut self) {
        self.policy.reset();
        self.exhausted = false;
    }

    /// Applies a baseline event. Returns true when a fresh attempt should run.
    pub fn handle_event(&mut self, event: BaselineEvent) -> bool {
        match event {
            BaselineEvent::SourceChanged(source) => {
                log::info!("baseline source changed: {}", source.describe());
                self.sources.cached = Some(source);
                self.reset_budget();
                true
            }
            BaselineEvent::SourceCleared => {
                self.sources.cached = None;
                false
            }
        }
    }

    /// Starts one acquisition attempt.
    pub fn attempt(&mut self) -> AcquisitionStep {
        if self.exhausted {
            return AcquisitionStep::Exhausted;
        }
        let Some(source) = self.sources.resolve().cloned() else {
            log::warn!(
                "no baseline image source available (attempt {}/{})",
                self.policy.failures() + 1,
                self.policy.max_attempts()
            );
            return self.fail(ZoneError::NoBaselineImage);
        };
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        log::debug!("loading baseline #{} from {}", ticket, source.describe());
        self.in_flight = Some(ticket);
        self.loader.request(ticket, source);
        AcquisitionStep::Pending
    }

    /// Collects a finished load, if any.
    pub fn poll(&mut self) -> Option<AcquisitionStep> {
        while let Some(result) = self.loader.poll() {
            if self.in_flight != Some(result.ticket) {
                log::debug!("dropping stale baseline load #{}", result.ticket);
                continue;
            }
            self.in_flight = None;
            return Some(match result.outcome {
                Ok(image) => self.install(image),
                Err(err) => self.fail(err),
            });
        }
        None
    }

    fn install(&mut self, image: BaselineImage) -> AcquisitionStep {
        let (canvas, scale) = CanvasSize::fit(image.width(), image.height(), self.bounds);
        log::info!(
            "baseline {}x{} loaded; canvas {}x{} at scale {:.4}",
            image.width(),
            image.height(),
            canvas.width,
            canvas.height,
            scale
        );
        self.image = Some(image);
        self.canvas = canvas;
        self.scale = scale;
        self.reset_budget();
        AcquisitionStep::Loaded { canvas, scale }
    }

    fn fail(&mut self, err: ZoneError) -> AcquisitionStep {
        match self.policy.record_failure() {
            RetryDecision::RetryAfter(delay) => {
                log::warn!(
                    "baseline acquisition failed ({}); retry {}/{} in {:?}",
                    err,
                    self.policy.failures(),
                    self.policy.max_attempts(),
                    delay
                );
                AcquisitionStep::RetryAfter(delay)
            }
            RetryDecision::Exhausted => {
                log::error!(
                    "baseline acquisition gave up after {} attempts: {}",
                    self.policy.failures(),
                    err
                );
                self.exhausted = true;
                AcquisitionStep::Exhausted
            }
        }
    }
}
