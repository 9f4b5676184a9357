//! The zone-drawing view as one explicit context object.
//!
//! `ZoneConsole` owns the zone store, the draft, baseline acquisition, the
//! view lifecycle and the timer queue. The host drives it from a single
//! thread: lifecycle calls when the view is shown or hidden, pointer events
//! as they arrive, and `tick` with a monotonic millisecond clock so retries
//! and worker results are picked up. Every mutation re-renders the current
//! frame into a [`DisplayList`].

use anyhow::Result;
use chrono::Utc;
use std::sync::mpsc::{Receiver, Sender};

use crate::baseline::{
    baseline_channel, AcquisitionController, AcquisitionStep, BaselineEvent, BaselineImage,
    ImageLoader,
};
use crate::config::ConsoleConfig;
use crate::draft::DraftPolygon;
use crate::geometry::{CanvasSize, Point};
use crate::interact::{InteractionController, InteractionOutcome, PointerEvent};
use crate::lifecycle::{ViewLifecycle, ViewState};
use crate::render::{render_pointer_preview, render_scene, DisplayList, Scene, Surface};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::schedule::{Scheduler, TimerId};
use crate::store::{export_file_name, LoadOutcome, ZoneCache, ZoneRemote, ZoneStore};
use crate::zone::{next_zone_id, Zone, ZoneCollection, ZoneParams};
use crate::{now_iso8601, ZoneError, ZoneResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Task {
    RetryBaseline,
    ResyncZones,
}

pub struct ZoneConsole<R, C, L> {
    store: ZoneStore<R, C>,
    draft: DraftPolygon,
    interaction: InteractionController,
    acquisition: AcquisitionController<L>,
    lifecycle: ViewLifecycle,
    scheduler: Scheduler<Task>,
    baseline_tx: Sender<BaselineEvent>,
    baseline_rx: Receiver<BaselineEvent>,
    sync_policy: RetryPolicy,
    baseline_timer: Option<TimerId>,
    resync_timer: Option<TimerId>,
    frame: DisplayList,
    busy: bool,
}

impl<R, C, L> ZoneConsole<R, C, L>
where
    R: ZoneRemote,
    C: ZoneCache,
    L: ImageLoader,
{
    pub fn new(
        store: ZoneStore<R, C>,
        acquisition: AcquisitionController<L>,
        sync_policy: RetryPolicy,
    ) -> Self {
        let (baseline_tx, baseline_rx) = baseline_channel();
        let frame = DisplayList::new(acquisition.canvas());
        Self {
            store,
            draft: DraftPolygon::new(),
            interaction: InteractionController::new(),
            acquisition,
            lifecycle: ViewLifecycle::new(),
            scheduler: Scheduler::new(),
            baseline_tx,
            baseline_rx,
            sync_policy,
            baseline_timer: None,
            resync_timer: None,
            frame,
            busy: false,
        }
    }

    pub fn from_config(cfg: &ConsoleConfig, remote: R, cache: C, loader: L) -> Self {
        Self::new(
            ZoneStore::new(remote, cache),
            AcquisitionController::new(loader, cfg.acquisition_policy(), cfg.canvas),
            cfg.sync_policy(),
        )
    }

    // -------------------- Lifecycle --------------------

    /// Sender for upload/confirm code to announce a new baseline.
    pub fn baseline_events(&self) -> Sender<BaselineEvent> {
        self.baseline_tx.clone()
    }

    pub fn view_state(&self) -> ViewState {
        self.lifecycle.state()
    }

    /// First display: loads zones and draws the (possibly empty) canvas.
    pub fn mount(&mut self) {
        if self.lifecycle.mount().is_some() {
            self.reload_zones();
        }
    }

    /// The view became visible: fresh retry budget and a baseline attempt.
    ///
    /// A baseline that is already loaded is kept; source changes arrive as
    /// [`BaselineEvent`]s and trigger their own fetch.
    pub fn activate(&mut self) {
        if self.lifecycle.activate().is_none() {
            return;
        }
        if !self.acquisition.is_loaded() {
            self.cancel_baseline_retry();
            self.acquisition.reset_budget();
            if !self.acquisition.is_pending() {
                self.acquire_baseline();
            }
        }
        self.redraw();
    }

    pub fn deactivate(&mut self) {
        if self.lifecycle.deactivate().is_some() {
            self.cancel_baseline_retry();
            self.interaction.reset();
            self.redraw();
        }
    }

    /// Tears the view down. Pending timers and the draft are dropped.
    pub fn shutdown(&mut self) {
        self.lifecycle.unmount();
        self.scheduler.clear();
        self.baseline_timer = None;
        self.resync_timer = None;
        self.draft.cancel();
        self.interaction.reset();
    }

    /// Advances the clock, runs due retries and collects worker results.
    pub fn tick(&mut self, now_ms: u64) {
        for task in self.scheduler.advance_to(now_ms) {
            match task {
                Task::RetryBaseline => {
                    self.baseline_timer = None;
                    if self.lifecycle.is_active() {
                        self.acquire_baseline();
                    }
                }
                Task::ResyncZones => {
                    self.resync_timer = None;
                    self.reload_zones();
                }
            }
        }

        // A new frame would rescale the canvas under the draft's points, so
        // source changes and finished loads wait until drawing ends.
        if self.draft.is_drawing() {
            return;
        }

        while let Ok(event) = self.baseline_rx.try_recv() {
            if self.acquisition.handle_event(event) && self.lifecycle.is_active() {
                self.cancel_baseline_retry();
                self.acquire_baseline();
            }
        }

        if let Some(step) = self.acquisition.poll() {
            self.apply_step(step);
        }
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.scheduler.next_deadline_ms()
    }

    // -------------------- Baseline --------------------

    pub fn baseline(&self) -> Option<&BaselineImage> {
        self.acquisition.image()
    }

    pub fn baseline_loaded(&self) -> bool {
        self.acquisition.is_loaded()
    }

    pub fn baseline_exhausted(&self) -> bool {
        self.acquisition.is_exhausted()
    }

    pub fn baseline_retry_count(&self) -> u32 {
        self.acquisition.retry_count()
    }

    pub fn scale(&self) -> f64 {
        self.acquisition.scale()
    }

    pub fn canvas(&self) -> CanvasSize {
        self.acquisition.canvas()
    }

    fn acquire_baseline(&mut self) {
        let step = self.acquisition.attempt();
        self.apply_step(step);
    }

    fn apply_step(&mut self, step: AcquisitionStep) {
        match step {
            AcquisitionStep::Pending => {}
            AcquisitionStep::Loaded { .. } => {
                self.cancel_baseline_retry();
                self.redraw();
            }
            AcquisitionStep::RetryAfter(delay) => {
                self.cancel_baseline_retry();
                self.baseline_timer = Some(self.scheduler.schedule_in(delay, Task::RetryBaseline));
            }
            AcquisitionStep::Exhausted => {
                self.cancel_baseline_retry();
                self.redraw();
            }
        }
    }

    fn cancel_baseline_retry(&mut self) {
        if let Some(id) = self.baseline_timer.take() {
            self.scheduler.cancel(id);
        }
    }

    // -------------------- Zones --------------------

    pub fn zones(&self) -> &ZoneCollection {
        self.store.zones()
    }

    pub fn store(&self) -> &ZoneStore<R, C> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ZoneStore<R, C> {
        &mut self.store
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Loads from the backend, falling back to the pruned cache. When the
    /// backend was down a re-sync is scheduled while the budget lasts.
    pub fn reload_zones(&mut self) -> LoadOutcome {
        self.store.load_zones();
        let outcome = self.store.last_load().unwrap_or(LoadOutcome::Empty);
        if outcome.from_remote() {
            self.sync_policy.reset();
        } else if self.resync_timer.is_none() {
            match self.sync_policy.record_failure() {
                RetryDecision::RetryAfter(delay) => {
                    log::info!("zone re-sync scheduled in {:?}", delay);
                    self.resync_timer = Some(self.scheduler.schedule_in(delay, Task::ResyncZones));
                }
                RetryDecision::Exhausted => {
                    log::debug!("zone re-sync budget spent; staying on cached zones");
                }
            }
        }
        self.redraw();
        outcome
    }

    /// Persists the draft as a new zone. The draft is only reset once the
    /// backend accepted the zone; on any error it is left for another try.
    pub fn submit_zone(&mut self, params: &ZoneParams) -> ZoneResult<Zone> {
        if self.busy {
            return Err(ZoneError::Busy);
        }
        let zone = self.draft.prepare(
            params,
            self.store.zones(),
            next_zone_id(self.store.zones()),
            now_iso8601(),
        )?;
        self.busy = true;
        let saved = self.store.create_zone(zone.clone());
        self.busy = false;
        saved?;
        self.draft.cancel();
        self.interaction.reset();
        self.redraw();
        Ok(zone)
    }

    /// Deletes a zone the operator has already confirmed.
    pub fn delete_zone(&mut self, id: &str) -> ZoneResult<Option<Zone>> {
        if self.busy {
            return Err(ZoneError::Busy);
        }
        self.busy = true;
        let removed = self.store.delete_zone(id);
        self.busy = false;
        let removed = removed?;
        self.redraw();
        Ok(removed)
    }

    pub fn edit_zone(&mut self, _id: &str) -> ZoneResult<()> {
        Err(ZoneError::NotSupported("zone editing"))
    }

    pub fn export_json(&self) -> Result<String> {
        self.store.export_json()
    }

    /// Suggested download name for today's export.
    pub fn export_file_name(&self) -> String {
        export_file_name(Utc::now().date_naive())
    }

    pub fn import_config(&mut self, text: &str) -> ZoneResult<usize> {
        let count = self.store.import_config(text)?;
        self.redraw();
        Ok(count)
    }

    // -------------------- Drawing --------------------

    pub fn draft(&self) -> &DraftPolygon {
        &self.draft
    }

    /// Opens a drawing session. Without a baseline this fails and kicks off
    /// another acquisition, with a fresh budget if the last one gave up.
    pub fn start_drawing(&mut self) -> ZoneResult<()> {
        if let Err(err) = self.draft.start(self.acquisition.is_loaded()) {
            if !self.acquisition.is_pending() && self.baseline_timer.is_none() {
                if self.acquisition.is_exhausted() {
                    self.acquisition.reset_budget();
                }
                self.acquire_baseline();
            }
            return Err(err);
        }
        self.redraw();
        Ok(())
    }

    pub fn pointer(&mut self, event: PointerEvent) -> InteractionOutcome {
        let outcome = self.interaction.handle(
            event,
            &mut self.draft,
            self.acquisition.scale(),
            self.lifecycle.is_active(),
        );
        if outcome.needs_redraw() {
            self.redraw();
        }
        outcome
    }

    pub fn undo_point(&mut self) -> Option<Point> {
        let removed = self.draft.undo();
        if removed.is_some() {
            self.redraw();
        }
        removed
    }

    pub fn clear_points(&mut self) {
        self.draft.clear();
        self.redraw();
    }

    pub fn cancel_drawing(&mut self) {
        self.draft.cancel();
        self.interaction.reset();
        self.redraw();
    }

    // -------------------- Rendering --------------------

    /// The last rendered frame.
    pub fn frame(&self) -> &DisplayList {
        &self.frame
    }

    /// Renders the current scene, preview line included, onto `surface`.
    pub fn render_to<S: Surface + ?Sized>(&self, surface: &mut S) {
        let scene = self.scene();
        render_scene(surface, &scene);
        if let Some(pointer) = self.preview_pointer() {
            render_pointer_preview(surface, &scene, pointer);
        }
    }

    fn scene(&self) -> Scene<'_> {
        Scene {
            canvas: self.acquisition.canvas(),
            scale: self.acquisition.scale(),
            baseline: self.acquisition.image(),
            zones: self.store.zones().as_slice(),
            draft: self.draft.points(),
            show_missing_baseline: self.acquisition.is_exhausted(),
        }
    }

    fn preview_pointer(&self) -> Option<Point> {
        if self.draft.is_drawing() {
            self.interaction.pointer()
        } else {
            None
        }
    }

    fn redraw(&mut self) {
        let mut frame = std::mem::replace(&mut self.frame, DisplayList::new(CanvasSize::new(0, 0)));
        self.render_to(&mut frame);
        self.frame = frame;
    }
}
