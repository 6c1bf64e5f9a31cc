//! Lightweight media probing.
//!
//! [`probe`] opens a resource, reads what the player needs to know up front
//! (duration, frame size, nominal frame rate), and closes the demuxer again.

use std::time::Duration;

use crate::{decoder::StreamDecoder, error::FrameStepError, resource::ResourceHandle};

/// Facts about a resource's video stream.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct MediaInfo {
    /// The probed resource.
    pub resource: ResourceHandle,
    /// Media duration, `None` if the container does not report one.
    pub duration: Option<Duration>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frames per second; `0.0` if unknown.
    pub frames_per_second: f64,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format: String,
}

impl MediaInfo {
    /// Real frame interval derived from the frame rate, if known.
    ///
    /// Frame stepping uses a fixed nominal duration instead; this is for
    /// display.
    pub fn frame_interval(&self) -> Option<Duration> {
        (self.frames_per_second > 0.0).then(|| Duration::from_secs_f64(1.0 / self.frames_per_second))
    }
}

/// Probe `resource`.
///
/// # Errors
///
/// Returns [`FrameStepError::ResourceOpen`] if the resource cannot be opened,
/// or [`FrameStepError::NoVideoStream`] if it has no video.
///
/// # Example
///
/// ```no_run
/// use framestep::ResourceHandle;
///
/// let info = framestep::probe(&ResourceHandle::from_path("run.mp4"))?;
/// println!("{}x{} @ {} fps, {:?}", info.width, info.height, info.frames_per_second, info.duration);
/// # Ok::<(), framestep::FrameStepError>(())
/// ```
pub fn probe(resource: &ResourceHandle) -> Result<MediaInfo, FrameStepError> {
    let path = resource.resolve()?;
    let decoder = StreamDecoder::open(&path, None)?;
    let info = decoder.info().clone();

    Ok(MediaInfo {
        resource: resource.clone(),
        duration: info.duration,
        width: info.width,
        height: info.height,
        frames_per_second: info.frames_per_second,
        codec: info.codec,
        format: info.format,
    })
}
