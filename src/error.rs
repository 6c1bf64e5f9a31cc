//! Error types for the `framestep` crate.
//!
//! This module defines [`FrameStepError`], the unified error type returned by
//! every fallible operation in the crate. Most command-style methods on
//! [`PlaybackController`](crate::PlaybackController) and
//! [`FrameExporter`](crate::FrameExporter) absorb these errors and turn them
//! into a [`Notice`](crate::Notice); the `try_*` layer underneath returns them
//! directly so callers that want the detail can have it.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `framestep` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameStepError {
    /// The resource could not be opened.
    #[error("Failed to open media resource {resource}: {reason}")]
    ResourceOpen {
        /// Display form of the resource that was requested.
        resource: String,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The resource does not contain a video stream.
    #[error("No video stream found in resource")]
    NoVideoStream,

    /// The pipeline failed to prepare the loaded resource.
    #[error("Failed to prepare media: {0}")]
    PrepareError(String),

    /// A seek request could not be completed.
    #[error("Failed to seek to {position:?}: {reason}")]
    SeekError {
        /// The requested target position.
        position: Duration,
        /// Underlying reason.
        reason: String,
    },

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// The decoder produced no frame near the requested position.
    #[error("No frame could be retrieved at {0:?}")]
    NoFrameAt(Duration),

    /// A playback rate that is not a positive, finite number.
    #[error("Invalid playback rate: {0}")]
    InvalidRate(f64),

    /// A rate that is not part of the configured slow-motion presets.
    #[error("Rate {0} is not one of the configured slow-motion presets")]
    UnknownRatePreset(f64),

    /// The export destination could not be prepared or written.
    #[error("Failed to persist frame to {path}: {reason}")]
    PersistError {
        /// Destination that was being written.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// No Tokio runtime was available to drive position polling.
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for FrameStepError {
    fn from(error: FfmpegError) -> Self {
        FrameStepError::FfmpegError(error.to_string())
    }
}
