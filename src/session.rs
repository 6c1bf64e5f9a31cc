//! The single decode/render session.
//!
//! [`MediaSession`] owns at most one [`MediaPipeline`] and translates
//! controller intents into pipeline primitives. It is deliberately lenient:
//! apart from [`create`](MediaSession::create) and
//! [`load`](MediaSession::load), every operation on a session without a
//! pipeline is a silent no-op, so callers never have to check first.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::{
    configuration::LoadControl,
    conversion::{clamp_offset_ms, duration_to_ms},
    error::FrameStepError,
    pipeline::{MediaPipeline, PipelineFactory, PlaybackRate, PositionSource, SeekMode},
    resource::ResourceHandle,
};

/// Callback the session forwards every is-playing change to.
pub type PlayingChanged = Arc<dyn Fn(bool) + Send + Sync>;

/// Callback the session forwards asynchronous pipeline errors to.
pub type PipelineFailed = Arc<dyn Fn(FrameStepError) + Send + Sync>;

/// Owner of the one active decode/render pipeline.
pub struct MediaSession {
    factory: Arc<dyn PipelineFactory>,
    load_control: LoadControl,
    pipeline: Option<Box<dyn MediaPipeline>>,
    /// Mirror of the pipeline's playing signal, written only by its listener.
    playing: Arc<AtomicBool>,
    on_playing_changed: PlayingChanged,
    on_error: Option<PipelineFailed>,
    resource: Option<ResourceHandle>,
}

impl Debug for MediaSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaSession")
            .field("active", &self.pipeline.is_some())
            .field("playing", &self.playing.load(Ordering::Acquire))
            .field("resource", &self.resource)
            .field("load_control", &self.load_control)
            .finish_non_exhaustive()
    }
}

impl MediaSession {
    /// Create an empty session. No pipeline is built until
    /// [`create`](MediaSession::create) or [`load`](MediaSession::load).
    ///
    /// `load_control` is passed to the factory as-is; the controller hands in
    /// the already-reduced thresholds.
    pub fn new(
        factory: Arc<dyn PipelineFactory>,
        load_control: LoadControl,
        on_playing_changed: PlayingChanged,
    ) -> Self {
        Self {
            factory,
            load_control,
            pipeline: None,
            playing: Arc::new(AtomicBool::new(false)),
            on_playing_changed,
            on_error: None,
            resource: None,
        }
    }

    /// Forward errors the pipeline reports from its own threads to
    /// `on_error`. Without a handler they are only logged.
    ///
    /// Takes effect for pipelines built after this call.
    #[must_use]
    pub fn with_error_handler(mut self, on_error: PipelineFailed) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// Build the pipeline if it does not exist yet.
    ///
    /// Idempotent: an existing pipeline is kept and no second one is built.
    ///
    /// # Errors
    ///
    /// Returns whatever the [`PipelineFactory`] reports.
    pub fn create(&mut self) -> Result<(), FrameStepError> {
        if self.pipeline.is_some() {
            return Ok(());
        }

        log::debug!(
            "Building pipeline (buffer_for_playback={:?}, min_buffer={:?})",
            self.load_control.buffer_for_playback,
            self.load_control.min_buffer,
        );
        let mut pipeline = self.factory.build(&self.load_control)?;

        let mirror = Arc::clone(&self.playing);
        let forward = Arc::clone(&self.on_playing_changed);
        pipeline.set_playing_listener(Box::new(move |playing| {
            mirror.store(playing, Ordering::Release);
            forward(playing);
        }));

        let on_error = self.on_error.clone();
        pipeline.set_error_listener(Box::new(move |error| {
            log::warn!("Pipeline error: {error}");
            if let Some(on_error) = &on_error {
                on_error(error);
            }
        }));

        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Replace the current media with `resource` and render its first frame
    /// paused.
    ///
    /// Stops current playback, clears queued media, prepares the new source
    /// and seeks exactly to zero without starting playback.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline cannot be built, or the media cannot
    /// be prepared or seeked. The session is then left with no resource.
    pub fn load(&mut self, resource: &ResourceHandle) -> Result<(), FrameStepError> {
        self.create()?;
        self.resource = None;

        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(());
        };

        pipeline.stop();
        pipeline.clear_media();
        pipeline.set_media(resource);
        pipeline.prepare()?;
        pipeline.seek_to(Duration::ZERO, SeekMode::Exact)?;
        pipeline.pause();

        log::info!("Loaded {resource}");
        self.resource = Some(resource.clone());
        Ok(())
    }

    /// Change the playback rate. Takes visible effect on the next play.
    pub fn set_rate(&mut self, rate: PlaybackRate) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.set_playback_rate(rate);
        }
    }

    /// Seek by a signed offset from the current position, clamped at zero.
    ///
    /// Returns the position that was requested, or `None` without a pipeline.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's seek error.
    pub fn seek_relative(&mut self, delta_ms: i64) -> Result<Option<Duration>, FrameStepError> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(None);
        };
        let current = duration_to_ms(pipeline.position_source().position());
        let target = clamp_offset_ms(current, delta_ms);
        pipeline.seek_to(target, SeekMode::Exact)?;
        Ok(Some(target))
    }

    /// Seek to an absolute position, clamped at zero.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's seek error.
    pub fn seek_absolute(&mut self, position_ms: i64) -> Result<Option<Duration>, FrameStepError> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(None);
        };
        let target = clamp_offset_ms(0, position_ms);
        pipeline.seek_to(target, SeekMode::Exact)?;
        Ok(Some(target))
    }

    /// Start playback at the current rate.
    pub fn play(&mut self) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.play();
        }
    }

    /// Pause playback.
    pub fn pause(&mut self) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.pause();
        }
    }

    /// Tear the pipeline down. Repeated calls are no-ops.
    pub fn release(&mut self) {
        let Some(mut pipeline) = self.pipeline.take() else {
            return;
        };
        pipeline.release();
        self.resource = None;
        if self.playing.swap(false, Ordering::AcqRel) {
            (self.on_playing_changed)(false);
        }
        log::info!("Released playback session");
    }

    /// `true` while a pipeline exists.
    pub fn is_active(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Mirror of the pipeline's playing signal.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Current position, zero without a pipeline.
    pub fn position(&self) -> Duration {
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.position_source().position())
            .unwrap_or(Duration::ZERO)
    }

    /// Media duration, `None` while unknown or without a pipeline.
    pub fn duration(&self) -> Option<Duration> {
        self.pipeline
            .as_ref()
            .and_then(|pipeline| pipeline.position_source().duration())
    }

    /// Current playback rate, normal speed without a pipeline.
    pub fn playback_rate(&self) -> PlaybackRate {
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.playback_rate())
            .unwrap_or_default()
    }

    /// The pipeline's clock, for the position poller.
    pub fn position_source(&self) -> Option<Arc<dyn PositionSource>> {
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.position_source())
    }

    /// The currently loaded resource.
    pub fn resource(&self) -> Option<&ResourceHandle> {
        self.resource.as_ref()
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.release();
    }
}
