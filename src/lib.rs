//! # framestep
//!
//! Frame-accurate video review: load a clip, step through it a frame at a
//! time, hold to play in slow motion, scrub, zoom, and save any frame as a
//! JPEG. Built for coaches and athletes breaking down technique, powered by
//! FFmpeg via the [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ### Step Through a Clip
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framestep::{EngineOptions, FfmpegPipeline, LogNotifier, PlaybackController, ResourceHandle};
//!
//! # async fn example() -> Result<(), framestep::FrameStepError> {
//! let mut controller = PlaybackController::new(
//!     FfmpegPipeline::factory(),
//!     EngineOptions::new(),
//!     Arc::new(LogNotifier),
//! )?;
//! controller.load(&ResourceHandle::from_path("run.mp4"));
//!
//! controller.step_frames(30); // about one second forward
//! controller.step_frames(-1); // one frame back
//! println!("at {} of {} ms", controller.position_ms(), controller.duration_ms());
//! # Ok(())
//! # }
//! ```
//!
//! ### Follow the Playhead
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use framestep::{EngineOptions, FfmpegPipeline, LogNotifier, PlaybackController};
//! # async fn example() -> Result<(), framestep::FrameStepError> {
//! # let controller = PlaybackController::new(FfmpegPipeline::factory(), EngineOptions::new(), Arc::new(LogNotifier))?;
//! let mut updates = controller.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = *updates.borrow();
//!     println!("{} / {} ms, playing: {}", snapshot.position_ms, snapshot.duration_ms, snapshot.is_playing);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Save the Current Frame
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use framestep::{EngineOptions, FfmpegPipeline, LogNotifier, PlaybackController};
//! use framestep::{ExportOptions, FfmpegFrameRetriever, FrameExporter, GalleryStore};
//!
//! # async fn example() -> Result<(), framestep::FrameStepError> {
//! # let controller = PlaybackController::new(FfmpegPipeline::factory(), EngineOptions::new(), Arc::new(LogNotifier))?;
//! let exporter = FrameExporter::new(
//!     Arc::new(FfmpegFrameRetriever::new()),
//!     GalleryStore::new(ExportOptions::new()),
//!     Arc::new(LogNotifier),
//! );
//! if let Some(export) = controller.export_current_frame_async(&exporter) {
//!     export.await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`MediaSession`] owns the decode/render pipeline and its lifecycle.
//! - [`PlaybackController`] is the only writer of the session and encodes
//!   playback policy (normal-speed play, exact frame steps, slow-motion holds,
//!   scrubbing).
//! - [`PositionSync`] publishes [`PlaybackSnapshot`]s while playing.
//! - [`FrameExporter`] captures frames from the original resource on its own
//!   decoder and writes them through a [`GalleryStore`].
//!
//! The pipeline is abstracted behind [`MediaPipeline`]; [`FfmpegPipeline`] is
//! the shipped implementation.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system. A Tokio
//! runtime is required for position polling and background exports.

pub mod configuration;
pub mod controller;
mod conversion;
mod decoder;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod ffmpeg_pipeline;
pub mod gesture;
pub mod notice;
pub mod pipeline;
pub mod probe;
pub mod resource;
pub mod retriever;
pub mod session;
pub mod sync;
pub mod view;

pub use configuration::{
    DEFAULT_RATE_PRESETS, EngineOptions, ExportOptions, LoadControl, NOMINAL_FRAME_DURATION,
};
pub use controller::{HoldControl, PlaybackController, SlowMotionState};
pub use error::FrameStepError;
pub use export::{
    ExportFuture, ExportedFrame, FrameExporter, FrameRetriever, FrameSource, GalleryStore,
};
pub use ffmpeg::{FfmpegLogLevel, ffmpeg_log_level, set_ffmpeg_log_level};
pub use ffmpeg_pipeline::{FfmpegPipeline, FfmpegPipelineFactory, PlaybackClock, RenderedFrame};
pub use gesture::{GestureAction, GestureEvent, HoldGestureState, HoldZone, StepDirection};
pub use notice::{LogNotifier, Notice, Notifier};
pub use pipeline::{
    ErrorListener, MediaPipeline, PipelineFactory, PlaybackRate, PlayingListener, PositionSource,
    SeekMode,
};
pub use probe::{MediaInfo, probe};
pub use resource::ResourceHandle;
pub use retriever::FfmpegFrameRetriever;
pub use session::{MediaSession, PipelineFailed, PlayingChanged};
pub use sync::{PlaybackSnapshot, PositionSync};
pub use view::ViewTransform;
