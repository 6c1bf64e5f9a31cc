//! Playback policy.
//!
//! [`PlaybackController`] is the only thing that mutates the
//! [`MediaSession`]. It encodes the product rules: the primary play control
//! always plays at normal speed, frame steps are exact seeks of a nominal
//! frame duration, holding a stepping control plays in slow motion and
//! releasing it pauses on the spot, and a manual scrub always beats the
//! position poller.
//!
//! Commands are fire-and-forget. Recoverable failures are logged and reported
//! through the [`Notifier`], including failures the pipeline hits later on its
//! own threads; commands issued with nothing loaded do nothing.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framestep::{
//!     EngineOptions, FfmpegPipeline, HoldZone, LogNotifier, PlaybackController,
//!     PlaybackRate, ResourceHandle, StepDirection,
//! };
//!
//! # async fn example() -> Result<(), framestep::FrameStepError> {
//! let mut controller = PlaybackController::new(
//!     FfmpegPipeline::factory(),
//!     EngineOptions::new(),
//!     Arc::new(LogNotifier),
//! )?;
//!
//! controller.load(&ResourceHandle::from_path("run.mp4"));
//! controller.step_frames(30);
//! controller.step_frame(StepDirection::Backward);
//!
//! controller.begin_slow_motion_hold(HoldZone::SmallStep, PlaybackRate::new(0.2)?);
//! controller.end_slow_motion_hold(HoldZone::SmallStep);
//! assert!(!controller.is_playing());
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use tokio::{runtime::Handle, sync::watch};

use crate::{
    configuration::EngineOptions,
    conversion::{duration_or_sentinel_ms, duration_to_ms},
    error::FrameStepError,
    export::{ExportFuture, ExportedFrame, FrameExporter, FrameRetriever, GalleryStore},
    gesture::{self, GestureAction, GestureEvent, HoldGestureState, HoldZone, StepDirection},
    notice::{Notice, Notifier},
    pipeline::{PipelineFactory, PlaybackRate},
    resource::ResourceHandle,
    session::MediaSession,
    sync::{PlaybackSnapshot, PositionSync},
    view::ViewTransform,
};

/// Slow-motion settings and per-zone hold flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlowMotionState {
    /// Rate used when a hold begins through a gesture.
    pub rate_multiplier: PlaybackRate,
    holds: [bool; 2],
    gestures: [HoldGestureState; 2],
}

impl SlowMotionState {
    fn new(rate_multiplier: PlaybackRate) -> Self {
        Self {
            rate_multiplier,
            holds: [false; 2],
            gestures: [HoldGestureState::Idle; 2],
        }
    }

    /// Whether `zone` is currently held.
    pub fn is_hold_active(&self, zone: HoldZone) -> bool {
        self.holds[zone.index()]
    }

    /// Whether any zone is held.
    pub fn any_hold_active(&self) -> bool {
        self.holds.iter().any(|&held| held)
    }

    /// Gesture state of `zone`.
    pub fn gesture_state(&self, zone: HoldZone) -> HoldGestureState {
        self.gestures[zone.index()]
    }

    fn clear_holds(&mut self) {
        self.holds = [false; 2];
        self.gestures = [HoldGestureState::Idle; 2];
    }
}

/// A hold-capable stepping control: which zone, and which way a tap steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldControl {
    /// Zone whose hold flag the control drives.
    pub zone: HoldZone,
    /// Direction of the discrete step performed on tap.
    pub direction: StepDirection,
}

impl HoldControl {
    /// Create a control description.
    pub fn new(zone: HoldZone, direction: StepDirection) -> Self {
        Self { zone, direction }
    }
}

/// Sequences the session lifecycle and encodes playback policy.
pub struct PlaybackController {
    session: MediaSession,
    sync: PositionSync,
    slow_motion: SlowMotionState,
    view: ViewTransform,
    options: EngineOptions,
    notifier: Arc<dyn Notifier>,
}

impl Debug for PlaybackController {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PlaybackController")
            .field("session", &self.session)
            .field("sync", &self.sync)
            .field("slow_motion", &self.slow_motion)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    /// Create a controller on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStepError::NoRuntime`] when called outside a runtime.
    pub fn new(
        factory: Arc<dyn PipelineFactory>,
        options: EngineOptions,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, FrameStepError> {
        let runtime =
            Handle::try_current().map_err(|error| FrameStepError::NoRuntime(error.to_string()))?;
        Ok(Self::with_runtime(runtime, factory, options, notifier))
    }

    /// Create a controller whose position poller runs on `runtime`.
    pub fn with_runtime(
        runtime: Handle,
        factory: Arc<dyn PipelineFactory>,
        options: EngineOptions,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let sync = PositionSync::new(runtime, options.poll_interval, options.settle_delay);
        let forward = sync.clone();
        let fallback = sync.clone();
        let reporter = Arc::clone(&notifier);
        let session = MediaSession::new(
            factory,
            options.effective_load_control(),
            Arc::new(move |playing| forward.on_playing_changed(playing)),
        )
        .with_error_handler(Arc::new(move |error| {
            reporter.notify(&Notice::PlaybackError {
                message: error.to_string(),
            });
            // The pipeline has rolled back; republish its last good state.
            fallback.refresh();
        }));

        Self {
            session,
            sync,
            slow_motion: SlowMotionState::new(options.default_slow_motion_rate),
            view: ViewTransform::default(),
            options,
            notifier,
        }
    }

    /// Build the pipeline ahead of the first load. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the pipeline factory's error.
    pub fn create_session(&mut self) -> Result<(), FrameStepError> {
        self.session.create()
    }

    /// Load `resource`, reporting failures as a notice.
    pub fn load(&mut self, resource: &ResourceHandle) {
        if let Err(error) = self.try_load(resource) {
            self.report(error);
        }
    }

    /// Load `resource` and render its first frame paused.
    ///
    /// Supersedes anything in flight: hold and gesture state are cleared, the
    /// view transform resets, and the published snapshot reads
    /// `(false, 0, duration)`.
    ///
    /// # Errors
    ///
    /// Returns the session's prepare or seek error. The controller is then
    /// left with nothing loaded.
    pub fn try_load(&mut self, resource: &ResourceHandle) -> Result<(), FrameStepError> {
        self.slow_motion.clear_holds();
        self.view.reset();

        match self.session.load(resource) {
            Ok(()) => {
                self.sync.attach(self.session.position_source());
                Ok(())
            }
            Err(error) => {
                self.sync.detach();
                Err(error)
            }
        }
    }

    /// Pause if playing; otherwise reset to normal speed and play.
    ///
    /// This is the only path that forces `1.0×`, so the primary play control
    /// can never leave the user stuck in slow motion.
    pub fn toggle_play_pause(&mut self) {
        if self.session.resource().is_none() {
            return;
        }
        self.slow_motion.clear_holds();
        if self.session.is_playing() {
            log::debug!("Pause");
            self.session.pause();
        } else {
            log::debug!("Play at normal speed");
            self.session.set_rate(PlaybackRate::NORMAL);
            self.session.play();
        }
    }

    /// Step one nominal frame.
    pub fn step_frame(&mut self, direction: StepDirection) {
        self.step_frames(direction.signum());
    }

    /// Step `count` nominal frames; negative counts step backwards.
    ///
    /// The step size is the configured nominal frame duration, not the
    /// media's real frame interval.
    pub fn step_frames(&mut self, count: i64) {
        let frame_ms = duration_to_ms(self.options.frame_duration);
        let delta_ms = count.saturating_mul(frame_ms);
        log::debug!("Step {count} frame(s) ({delta_ms} ms)");
        let result = self.session.seek_relative(delta_ms);
        self.after_seek(result);
    }

    /// Step one frame forward or backward.
    pub fn seek_frame(&mut self, forward: bool) {
        let direction = if forward {
            StepDirection::Forward
        } else {
            StepDirection::Backward
        };
        self.step_frame(direction);
    }

    /// Alias of [`step_frames`](PlaybackController::step_frames).
    pub fn seek_frames(&mut self, count: i64) {
        self.step_frames(count);
    }

    /// Exact seek to `position_ms`, clamped at zero.
    pub fn seek_to(&mut self, position_ms: i64) {
        log::debug!("Seek to {position_ms} ms");
        let result = self.session.seek_absolute(position_ms);
        self.after_seek(result);
    }

    /// Start slow-motion playback for a held zone.
    pub fn begin_slow_motion_hold(&mut self, zone: HoldZone, rate: PlaybackRate) {
        if self.session.resource().is_none() {
            return;
        }
        log::debug!("Hold {zone:?} at {rate}");
        self.slow_motion.holds[zone.index()] = true;
        self.session.set_rate(rate);
        self.session.play();
    }

    /// Release a held zone: pause immediately if it was active.
    pub fn end_slow_motion_hold(&mut self, zone: HoldZone) {
        let held = &mut self.slow_motion.holds[zone.index()];
        if !*held {
            return;
        }
        *held = false;
        log::debug!("Release {zone:?}");
        self.session.pause();
    }

    /// Choose the rate used by gesture-driven holds.
    ///
    /// Applied immediately if a hold is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStepError::UnknownRatePreset`] if `rate` is not one of
    /// the configured presets.
    pub fn select_slow_motion_rate(&mut self, rate: f64) -> Result<PlaybackRate, FrameStepError> {
        let preset = self.options.find_preset(rate)?;
        self.slow_motion.rate_multiplier = preset;
        if self.slow_motion.any_hold_active() {
            self.session.set_rate(preset);
        }
        Ok(preset)
    }

    /// Feed a press/hold/release event for `control` and perform the
    /// resulting action.
    ///
    /// A tap steps (one frame for the small zone, the large-step count for
    /// the large zone); a hold plays at the selected slow-motion rate; the
    /// release after a hold pauses.
    pub fn handle_gesture(&mut self, control: HoldControl, event: GestureEvent) -> GestureAction {
        let index = control.zone.index();
        let (next, action) = gesture::advance(self.slow_motion.gestures[index], event);
        self.slow_motion.gestures[index] = next;

        match action {
            GestureAction::None => {}
            GestureAction::Step => {
                let frames = match control.zone {
                    HoldZone::LargeStep => i64::from(self.options.large_step_frames),
                    HoldZone::SmallStep => 1,
                };
                self.step_frames(frames * control.direction.signum());
            }
            GestureAction::BeginHold => {
                let rate = self.slow_motion.rate_multiplier;
                self.begin_slow_motion_hold(control.zone, rate);
            }
            GestureAction::EndHold => self.end_slow_motion_hold(control.zone),
        }
        action
    }

    /// Enter scrub mode. Position polling is suspended until
    /// [`end_scrub`](PlaybackController::end_scrub).
    pub fn begin_scrub(&mut self) {
        if self.session.resource().is_some() {
            self.sync.begin_scrub();
        }
    }

    /// Track the scrub control's value without seeking.
    pub fn scrub_to(&mut self, position_ms: i64) {
        self.sync.scrub_to(position_ms);
    }

    /// Commit the scrub with exactly one seek to the last scrubbed value,
    /// then resume polling.
    pub fn end_scrub(&mut self) {
        if let Some(position_ms) = self.sync.commit_scrub() {
            self.seek_to(position_ms);
        }
        self.sync.resume();
    }

    /// Build an exporter writing with the configured [`ExportOptions`]
    /// and reporting to this controller's notifier.
    ///
    /// [`ExportOptions`]: crate::ExportOptions
    pub fn frame_exporter(&self, retriever: Arc<dyn FrameRetriever>) -> FrameExporter {
        FrameExporter::new(
            retriever,
            GalleryStore::new(self.options.export.clone()),
            Arc::clone(&self.notifier),
        )
    }

    /// Export the frame at the current position via `exporter`.
    ///
    /// Does nothing when no resource is loaded.
    pub fn export_current_frame(&self, exporter: &FrameExporter) -> Option<ExportedFrame> {
        let resource = self.session.resource()?;
        exporter.export_current_frame(resource, self.position_ms())
    }

    /// Export the frame at the current position on a blocking worker.
    ///
    /// Returns `None` without a loaded resource.
    pub fn export_current_frame_async(&self, exporter: &FrameExporter) -> Option<ExportFuture> {
        let resource = self.session.resource()?;
        Some(exporter.export_async(resource, self.position_ms()))
    }

    /// Release the session. Repeated calls are no-ops.
    pub fn release(&mut self) {
        if !self.session.is_active() {
            return;
        }
        self.slow_motion.clear_holds();
        self.session.release();
        self.sync.detach();
    }

    /// Mirror of the pipeline's playing signal.
    pub fn is_playing(&self) -> bool {
        self.session.is_playing()
    }

    /// Live position in milliseconds.
    pub fn position_ms(&self) -> i64 {
        duration_to_ms(self.session.position())
    }

    /// Duration in milliseconds; `1` while unknown.
    pub fn duration_ms(&self) -> i64 {
        duration_or_sentinel_ms(self.session.duration())
    }

    /// Current playback rate.
    pub fn playback_rate(&self) -> PlaybackRate {
        self.session.playback_rate()
    }

    /// Slow-motion settings and hold flags.
    pub fn slow_motion(&self) -> &SlowMotionState {
        &self.slow_motion
    }

    /// Whether `zone` is currently held.
    pub fn is_hold_active(&self, zone: HoldZone) -> bool {
        self.slow_motion.is_hold_active(zone)
    }

    /// The loaded resource.
    pub fn resource(&self) -> Option<&ResourceHandle> {
        self.session.resource()
    }

    /// `true` while a pipeline exists.
    pub fn is_session_active(&self) -> bool {
        self.session.is_active()
    }

    /// Most recently published snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.sync.snapshot()
    }

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.sync.subscribe()
    }

    /// The position synchroniser.
    pub fn position_sync(&self) -> &PositionSync {
        &self.sync
    }

    /// Pan/zoom state of the video surface.
    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    /// Mutable pan/zoom state.
    pub fn view_mut(&mut self) -> &mut ViewTransform {
        &mut self.view
    }

    /// The controller's configuration.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn after_seek(&mut self, result: Result<Option<Duration>, FrameStepError>) {
        match result {
            Ok(Some(_)) => self.sync.refresh(),
            Ok(None) => {}
            Err(error) => self.report(error),
        }
    }

    fn report(&self, error: FrameStepError) {
        log::warn!("Playback command failed: {error}");
        self.notifier.notify(&Notice::PlaybackError {
            message: error.to_string(),
        });
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.release();
    }
}
