//! Still-frame export.
//!
//! [`FrameExporter`] captures the frame at a position from the *original*
//! resource rather than the live render target: it opens its own short-lived
//! [`FrameSource`], asks for the frame closest to the position, releases the
//! source, and hands the image to a [`GalleryStore`]. The live session is
//! never touched, so tearing the session down never waits on an export.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framestep::{
//!     ExportOptions, FfmpegFrameRetriever, FrameExporter, GalleryStore, LogNotifier,
//!     ResourceHandle,
//! };
//!
//! let exporter = FrameExporter::new(
//!     Arc::new(FfmpegFrameRetriever::new()),
//!     GalleryStore::new(ExportOptions::new()),
//!     Arc::new(LogNotifier),
//! );
//! let resource = ResourceHandle::from_path("run.mp4");
//! if let Some(frame) = exporter.export_current_frame(&resource, 2_000) {
//!     println!("saved {}", frame.path.display());
//! }
//! ```

use std::{
    fs::{self, OpenOptions},
    future::Future,
    io::{ErrorKind, Write},
    path::PathBuf,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use image::{DynamicImage, codecs::jpeg::JpegEncoder};
use tokio::task::JoinHandle;

use crate::{
    configuration::ExportOptions,
    conversion::clamp_offset_ms,
    error::FrameStepError,
    notice::{Notice, Notifier},
    resource::ResourceHandle,
};

/// How many consecutive millisecond slots are tried when a file name is taken.
const MAX_NAME_ATTEMPTS: u32 = 64;

/// Opens short-lived frame sources on a resource.
pub trait FrameRetriever: Send + Sync {
    /// Open a new, independent source on `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStepError::ResourceOpen`] if the resource cannot be
    /// resolved or opened.
    fn open(&self, resource: &ResourceHandle) -> Result<Box<dyn FrameSource>, FrameStepError>;
}

/// A short-lived decoder on one resource. Released when dropped.
pub trait FrameSource: Send {
    /// Decode the frame whose timestamp is closest to `position`.
    ///
    /// Returns `Ok(None)` if the stream yields no frame at all.
    ///
    /// # Errors
    ///
    /// Returns decoding errors.
    fn frame_closest_to(
        &mut self,
        position: Duration,
    ) -> Result<Option<DynamicImage>, FrameStepError>;
}

/// A frame that has been written to the gallery. Never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFrame {
    /// Full path of the written JPEG.
    pub path: PathBuf,
    /// File name, `<prefix>_<epochMillis>.jpg`.
    pub display_name: String,
    /// Requested capture position.
    pub position: Duration,
    /// Wall-clock capture time in milliseconds since the Unix epoch.
    pub captured_at_ms: u128,
}

/// Writes exported frames as JPEG files into the gallery collection.
#[derive(Debug, Clone)]
pub struct GalleryStore {
    options: ExportOptions,
}

impl GalleryStore {
    /// Create a store writing to `options.collection_dir()`.
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    /// The store's settings.
    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// File name for a capture taken at `epoch_millis`.
    pub fn file_name(&self, epoch_millis: u128) -> String {
        format!("{}_{epoch_millis}.jpg", self.options.prefix)
    }

    /// Encode `image` and write it under a fresh timestamped name.
    ///
    /// The JPEG is encoded fully in memory first, and the destination entry
    /// is only created once there is something to write; a failed write
    /// removes the entry again.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStepError::ImageError`] if encoding fails, or
    /// [`FrameStepError::PersistError`] if the collection cannot be created
    /// or the file cannot be written.
    pub fn save(
        &self,
        image: &DynamicImage,
        position: Duration,
    ) -> Result<ExportedFrame, FrameStepError> {
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.options.quality)
            .encode_image(&image.to_rgb8())?;

        let directory = self.options.collection_dir();
        fs::create_dir_all(&directory).map_err(|error| FrameStepError::PersistError {
            path: directory.clone(),
            reason: error.to_string(),
        })?;

        let mut captured_at_ms = epoch_millis();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let display_name = self.file_name(captured_at_ms);
            let path = directory.join(&display_name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                    captured_at_ms += 1;
                    continue;
                }
                Err(error) => {
                    return Err(FrameStepError::PersistError {
                        path,
                        reason: error.to_string(),
                    });
                }
            };

            if let Err(error) = file.write_all(&encoded).and_then(|()| file.flush()) {
                drop(file);
                let _ = fs::remove_file(&path);
                return Err(FrameStepError::PersistError {
                    path,
                    reason: error.to_string(),
                });
            }

            log::info!("Saved frame at {position:?} to {}", path.display());
            return Ok(ExportedFrame {
                path,
                display_name,
                position,
                captured_at_ms,
            });
        }

        Err(FrameStepError::PersistError {
            path: directory,
            reason: "no free file name".to_string(),
        })
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}

/// Captures frames from the original resource and persists them.
///
/// Cheap to clone; clones share the retriever, store and notifier.
#[derive(Clone)]
pub struct FrameExporter {
    retriever: Arc<dyn FrameRetriever>,
    store: Arc<GalleryStore>,
    notifier: Arc<dyn Notifier>,
}

impl FrameExporter {
    /// Create an exporter.
    pub fn new(
        retriever: Arc<dyn FrameRetriever>,
        store: GalleryStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            retriever,
            store: Arc::new(store),
            notifier,
        }
    }

    /// The gallery this exporter writes to.
    pub fn store(&self) -> &GalleryStore {
        &self.store
    }

    /// Capture and persist the frame closest to `position`.
    ///
    /// The frame source is dropped before the image is written, whatever
    /// the outcome.
    ///
    /// # Errors
    ///
    /// - [`FrameStepError::ResourceOpen`] if the resource cannot be opened.
    /// - [`FrameStepError::NoFrameAt`] if no frame could be decoded.
    /// - Encoding or persistence errors from [`GalleryStore::save`].
    pub fn try_export(
        &self,
        resource: &ResourceHandle,
        position: Duration,
    ) -> Result<ExportedFrame, FrameStepError> {
        log::debug!("Exporting frame at {position:?} from {resource}");
        let image = {
            let mut source = self.retriever.open(resource)?;
            source.frame_closest_to(position)?
        };
        let image = image.ok_or(FrameStepError::NoFrameAt(position))?;
        self.store.save(&image, position)
    }

    /// Export the frame at `position_ms`, reporting the outcome as a notice.
    ///
    /// Never fails: every error is logged and collapsed into a single
    /// [`Notice::ExportFailed`]. Negative positions clamp to zero.
    pub fn export_current_frame(
        &self,
        resource: &ResourceHandle,
        position_ms: i64,
    ) -> Option<ExportedFrame> {
        let position = clamp_offset_ms(0, position_ms);
        match self.try_export(resource, position) {
            Ok(frame) => {
                self.notifier.notify(&Notice::FrameSaved {
                    path: frame.path.clone(),
                });
                Some(frame)
            }
            Err(error) => {
                log::warn!("Frame export failed: {error}");
                self.notifier.notify(&Notice::ExportFailed);
                None
            }
        }
    }

    /// Run [`export_current_frame`](FrameExporter::export_current_frame) on a
    /// blocking worker thread.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn export_async(&self, resource: &ResourceHandle, position_ms: i64) -> ExportFuture {
        let exporter = self.clone();
        let resource = resource.clone();
        let handle = tokio::task::spawn_blocking(move || {
            exporter.export_current_frame(&resource, position_ms)
        });
        ExportFuture {
            handle,
            notifier: Arc::clone(&self.notifier),
        }
    }
}

/// A future that resolves once a background export has finished.
///
/// Resolves to `None` on failure; the failure has already been notified.
pub struct ExportFuture {
    handle: JoinHandle<Option<ExportedFrame>>,
    notifier: Arc<dyn Notifier>,
}

impl Future for ExportFuture {
    type Output = Option<ExportedFrame>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let notifier = Arc::clone(&self.notifier);
        Pin::new(&mut self.handle).poll(cx).map(|result| {
            result.unwrap_or_else(|error| {
                log::warn!("Export task did not complete: {error}");
                notifier.notify(&Notice::ExportFailed);
                None
            })
        })
    }
}
