//! The decode/render pipeline seam.
//!
//! The engine never decodes video itself. It drives an external pipeline
//! through the primitive set described by [`MediaPipeline`]: set a source,
//! prepare it, seek, change rate, play, pause, read the clock, and receive a
//! single "is playing changed" notification plus reports of errors hit on
//! its own threads. [`FfmpegPipeline`](crate::FfmpegPipeline)
//! is the shipped implementation; hosts embedding a platform player implement
//! the trait themselves.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use crate::{configuration::LoadControl, error::FrameStepError, resource::ResourceHandle};

/// A positive, finite playback rate multiplier.
///
/// `1.0` is normal speed, `0.1` is ten times slower.
///
/// # Example
///
/// ```
/// use framestep::PlaybackRate;
///
/// let slow = PlaybackRate::new(0.25).unwrap();
/// assert_eq!(slow.get(), 0.25);
/// assert!(PlaybackRate::new(0.0).is_err());
/// assert!(PlaybackRate::new(f64::NAN).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PlaybackRate(pub(crate) f64);

impl PlaybackRate {
    /// Normal speed.
    pub const NORMAL: PlaybackRate = PlaybackRate(1.0);

    /// Validate and wrap a rate.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStepError::InvalidRate`] unless `rate` is finite and
    /// strictly positive.
    pub fn new(rate: f64) -> Result<Self, FrameStepError> {
        if rate.is_finite() && rate > 0.0 {
            Ok(Self(rate))
        } else {
            Err(FrameStepError::InvalidRate(rate))
        }
    }

    /// The raw multiplier.
    pub fn get(self) -> f64 {
        self.0
    }

    /// `true` for exactly `1.0`.
    pub fn is_normal(self) -> bool {
        self.0 == 1.0
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl Display for PlaybackRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x", self.0)
    }
}

/// How precisely a seek must land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekMode {
    /// Land within one frame of the request, decoding forward from the
    /// preceding keyframe. Slower, used for every user-facing seek.
    #[default]
    Exact,
    /// Land on the nearest keyframe. Faster but coarse.
    ClosestSync,
}

/// Listener invoked by a pipeline whenever its playing state flips.
///
/// Pipelines hold exactly one listener. It may be called from the pipeline's
/// own threads, and must never be called while the pipeline holds a lock
/// that [`PositionSource`] reads also take.
pub type PlayingListener = Box<dyn Fn(bool) + Send + Sync>;

/// Listener invoked when work running on a pipeline's own threads fails
/// after the triggering call has already returned: a deferred open, an exact
/// seek that could not be completed, or a decode error during playback.
///
/// These failures are not fatal. The pipeline keeps its last good state.
pub type ErrorListener = Box<dyn Fn(FrameStepError) + Send + Sync>;

/// Read-only view of a pipeline's clock.
///
/// Shared with the position poller so it can sample the live position
/// without going through the session owner.
pub trait PositionSource: Send + Sync {
    /// Current playback position.
    fn position(&self) -> Duration;

    /// Media duration, or `None` while unknown.
    fn duration(&self) -> Option<Duration>;
}

/// The primitive set of an external decode/render pipeline.
///
/// Implementations run their own decode thread(s). Every method is expected
/// to return promptly; long work (decoding up to an exact seek target) runs
/// asynchronously inside the pipeline.
pub trait MediaPipeline: Send {
    /// Install the single is-playing listener, replacing any previous one.
    fn set_playing_listener(&mut self, listener: PlayingListener);

    /// Install the single asynchronous error listener, replacing any
    /// previous one. Pipelines that only fail synchronously can keep the
    /// default, which drops the listener.
    fn set_error_listener(&mut self, listener: ErrorListener) {
        drop(listener);
    }

    /// Stop playback of the current media, keeping the pipeline alive.
    fn stop(&mut self);

    /// Drop any queued media items.
    fn clear_media(&mut self);

    /// Set the media to play next. Takes effect on [`prepare`](MediaPipeline::prepare).
    fn set_media(&mut self, resource: &ResourceHandle);

    /// Open and prepare the media set with [`set_media`](MediaPipeline::set_media).
    ///
    /// # Errors
    ///
    /// Returns an error if the media cannot be opened or has no video.
    fn prepare(&mut self) -> Result<(), FrameStepError>;

    /// Seek to `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if no media is prepared or the seek is rejected.
    fn seek_to(&mut self, position: Duration, mode: SeekMode) -> Result<(), FrameStepError>;

    /// Change the playback rate. Has no visible effect while paused.
    fn set_playback_rate(&mut self, rate: PlaybackRate);

    /// Current playback rate.
    fn playback_rate(&self) -> PlaybackRate;

    /// Start or resume playback.
    fn play(&mut self);

    /// Pause playback, keeping the current frame on screen.
    fn pause(&mut self);

    /// Whether the pipeline is currently playing.
    fn is_playing(&self) -> bool;

    /// A shareable handle on the pipeline's clock.
    fn position_source(&self) -> Arc<dyn PositionSource>;

    /// Tear the pipeline down and free its resources.
    fn release(&mut self);
}

/// Builds pipelines for a [`MediaSession`](crate::MediaSession).
///
/// Closures of the right shape implement this trait, which keeps tests and
/// simple hosts terse.
pub trait PipelineFactory: Send + Sync {
    /// Build a new pipeline configured with `load_control`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying decoder library cannot be
    /// initialised.
    fn build(&self, load_control: &LoadControl) -> Result<Box<dyn MediaPipeline>, FrameStepError>;
}

impl<F> PipelineFactory for F
where
    F: Fn(&LoadControl) -> Result<Box<dyn MediaPipeline>, FrameStepError> + Send + Sync,
{
    fn build(&self, load_control: &LoadControl) -> Result<Box<dyn MediaPipeline>, FrameStepError> {
        self(load_control)
    }
}
