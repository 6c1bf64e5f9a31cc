//! FFmpeg implementation of [`FrameRetriever`].

use std::time::Duration;

use image::DynamicImage;

use crate::{
    decoder::StreamDecoder,
    error::FrameStepError,
    export::{FrameRetriever, FrameSource},
    resource::ResourceHandle,
};

/// Opens a fresh FFmpeg demuxer per export and decodes the frame nearest to
/// the requested position.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use framestep::{FfmpegFrameRetriever, FrameRetriever, ResourceHandle};
///
/// let retriever = FfmpegFrameRetriever::new();
/// let mut source = retriever.open(&ResourceHandle::from_path("run.mp4"))?;
/// let image = source.frame_closest_to(Duration::from_secs(2))?;
/// # Ok::<(), framestep::FrameStepError>(())
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegFrameRetriever;

impl FfmpegFrameRetriever {
    /// Create a retriever.
    pub fn new() -> Self {
        Self
    }
}

impl FrameRetriever for FfmpegFrameRetriever {
    fn open(&self, resource: &ResourceHandle) -> Result<Box<dyn FrameSource>, FrameStepError> {
        let path = resource.resolve()?;
        let decoder = StreamDecoder::open(&path, None)?;
        Ok(Box::new(FfmpegFrameSource { decoder }))
    }
}

struct FfmpegFrameSource {
    decoder: StreamDecoder,
}

impl FrameSource for FfmpegFrameSource {
    fn frame_closest_to(
        &mut self,
        position: Duration,
    ) -> Result<Option<DynamicImage>, FrameStepError> {
        let Some(decoded) = self.decoder.closest_frame(position)? else {
            return Ok(None);
        };
        log::debug!(
            "Closest frame to {position:?} is at {:?}",
            decoded.position
        );
        self.decoder.render(&decoded).map(Some)
    }
}
