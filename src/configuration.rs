//! Engine configuration.
//!
//! [`EngineOptions`] is a builder that threads the product constants (rate
//! presets, nominal frame duration, poll cadence, settle delay, buffering and
//! export settings) through the engine without polluting every constructor.
//! The defaults reproduce the shipped behaviour.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use framestep::{EngineOptions, ExportOptions};
//!
//! let options = EngineOptions::new()
//!     .with_poll_interval(Duration::from_millis(50))
//!     .with_export(ExportOptions::new().with_namespace("Sprints").with_prefix("Sprint"));
//! ```

use std::{path::PathBuf, time::Duration};

use crate::{error::FrameStepError, pipeline::PlaybackRate};

/// Nominal duration of one frame, approximating 30 fps.
pub const NOMINAL_FRAME_DURATION: Duration = Duration::from_millis(33);

/// Default slow-motion presets offered to the user.
pub const DEFAULT_RATE_PRESETS: [f64; 5] = [0.1, 0.2, 0.3, 0.5, 1.0];

/// Buffering thresholds handed to a pipeline when it is built.
///
/// Field defaults match the usual player-library defaults. Use
/// [`reduced`](LoadControl::reduced) to shorten the initial-buffering
/// thresholds and get the first frame on screen sooner, at the cost of a
/// higher rebuffer risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadControl {
    /// Minimum media buffered ahead of the playhead.
    pub min_buffer: Duration,
    /// Maximum media buffered ahead of the playhead.
    pub max_buffer: Duration,
    /// Media that must be buffered before playback starts.
    pub buffer_for_playback: Duration,
    /// Media that must be buffered before playback resumes after a rebuffer.
    pub buffer_for_playback_after_rebuffer: Duration,
}

impl Default for LoadControl {
    fn default() -> Self {
        Self {
            min_buffer: Duration::from_millis(50_000),
            max_buffer: Duration::from_millis(50_000),
            buffer_for_playback: Duration::from_millis(2_500),
            buffer_for_playback_after_rebuffer: Duration::from_millis(5_000),
        }
    }
}

impl LoadControl {
    /// Divide every threshold except `max_buffer` by `divisor`.
    ///
    /// A divisor of 0 or 1 returns the thresholds unchanged.
    #[must_use]
    pub fn reduced(self, divisor: u32) -> Self {
        let divisor = divisor.max(1);
        Self {
            min_buffer: self.min_buffer / divisor,
            max_buffer: self.max_buffer,
            buffer_for_playback: self.buffer_for_playback / divisor,
            buffer_for_playback_after_rebuffer: self.buffer_for_playback_after_rebuffer / divisor,
        }
    }
}

/// Where and how exported frames are written.
///
/// Frames land in `<root>/<namespace>/<prefix>_<epochMillis>.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Gallery root. Defaults to the user's pictures directory.
    pub root: PathBuf,
    /// Sub-collection inside the gallery root.
    pub namespace: String,
    /// File name prefix.
    pub prefix: String,
    /// JPEG quality, 1–100.
    pub quality: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportOptions {
    /// Defaults: pictures directory, `SkiAnalysis` namespace, `SkiFrame`
    /// prefix, quality 100.
    pub fn new() -> Self {
        let root = dirs_next::picture_dir().unwrap_or_else(|| PathBuf::from("Pictures"));
        Self {
            root,
            namespace: "SkiAnalysis".to_string(),
            prefix: "SkiFrame".to_string(),
            quality: 100,
        }
    }

    /// Set the gallery root directory.
    #[must_use]
    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = root.into();
        self
    }

    /// Set the sub-collection name.
    #[must_use]
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the file name prefix.
    #[must_use]
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the JPEG quality. Clamped into 1–100.
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// The directory exported frames are written to.
    pub fn collection_dir(&self) -> PathBuf {
        self.root.join(&self.namespace)
    }
}

/// Configuration for a [`PlaybackController`](crate::PlaybackController).
///
/// All fields have defaults matching the product constants: 33 ms frames,
/// 100 ms polling, 500 ms settle delay, buffers halved, `0.1×` slow motion.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub(crate) rate_presets: Vec<PlaybackRate>,
    pub(crate) default_slow_motion_rate: PlaybackRate,
    pub(crate) frame_duration: Duration,
    pub(crate) large_step_frames: u32,
    pub(crate) poll_interval: Duration,
    pub(crate) settle_delay: Duration,
    pub(crate) buffer_divisor: u32,
    pub(crate) load_control: LoadControl,
    pub(crate) export: ExportOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineOptions {
    /// Create options with the default product constants.
    pub fn new() -> Self {
        Self {
            rate_presets: DEFAULT_RATE_PRESETS
                .iter()
                .map(|&rate| PlaybackRate(rate))
                .collect(),
            default_slow_motion_rate: PlaybackRate(0.1),
            frame_duration: NOMINAL_FRAME_DURATION,
            large_step_frames: 30,
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(500),
            buffer_divisor: 2,
            load_control: LoadControl::default(),
            export: ExportOptions::default(),
        }
    }

    /// Replace the slow-motion preset list.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStepError::InvalidRate`] if any preset is not a
    /// positive finite number, or if the list is empty.
    pub fn with_rate_presets(mut self, presets: &[f64]) -> Result<Self, FrameStepError> {
        if presets.is_empty() {
            return Err(FrameStepError::InvalidRate(0.0));
        }
        let presets = presets
            .iter()
            .map(|&rate| PlaybackRate::new(rate))
            .collect::<Result<Vec<_>, _>>()?;
        if !presets.contains(&self.default_slow_motion_rate) {
            self.default_slow_motion_rate = presets[0];
        }
        self.rate_presets = presets;
        Ok(self)
    }

    /// Set the slow-motion rate selected after construction and on load.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStepError::UnknownRatePreset`] if `rate` is not in the
    /// preset list.
    pub fn with_default_slow_motion_rate(mut self, rate: f64) -> Result<Self, FrameStepError> {
        self.default_slow_motion_rate = self.find_preset(rate)?;
        Ok(self)
    }

    /// Set the nominal frame duration used by frame stepping.
    /// Clamped to a minimum of 1 ms.
    #[must_use]
    pub fn with_frame_duration(mut self, duration: Duration) -> Self {
        self.frame_duration = duration.max(Duration::from_millis(1));
        self
    }

    /// Set how many frames the large-step control jumps. Clamped to at least 1.
    #[must_use]
    pub fn with_large_step_frames(mut self, frames: u32) -> Self {
        self.large_step_frames = frames.max(1);
        self
    }

    /// Set the position polling cadence. Clamped to a minimum of 1 ms.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the post-load settle delay before the authoritative refresh.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the library-default buffering thresholds before reduction.
    #[must_use]
    pub fn with_load_control(mut self, load_control: LoadControl) -> Self {
        self.load_control = load_control;
        self
    }

    /// Set the divisor applied to initial-buffering thresholds.
    /// `2` halves them; `1` keeps the library defaults.
    #[must_use]
    pub fn with_buffer_divisor(mut self, divisor: u32) -> Self {
        self.buffer_divisor = divisor.max(1);
        self
    }

    /// Set the export settings.
    #[must_use]
    pub fn with_export(mut self, export: ExportOptions) -> Self {
        self.export = export;
        self
    }

    /// The configured slow-motion presets.
    pub fn rate_presets(&self) -> &[PlaybackRate] {
        &self.rate_presets
    }

    /// The nominal frame duration.
    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// The position polling cadence.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The post-load settle delay.
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// The export settings.
    pub fn export(&self) -> &ExportOptions {
        &self.export
    }

    /// Buffering thresholds actually handed to the pipeline.
    pub fn effective_load_control(&self) -> LoadControl {
        self.load_control.reduced(self.buffer_divisor)
    }

    pub(crate) fn find_preset(&self, rate: f64) -> Result<PlaybackRate, FrameStepError> {
        self.rate_presets
            .iter()
            .copied()
            .find(|preset| (preset.get() - rate).abs() < 1e-9)
            .ok_or(FrameStepError::UnknownRatePreset(rate))
    }
}
