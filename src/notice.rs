//! User-facing notifications.
//!
//! Recoverable failures never escape the engine as errors or panics. They are
//! turned into a [`Notice`] and handed to the host's [`Notifier`], which
//! typically shows a one-line transient message.

use std::path::PathBuf;

/// A single-line, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Notice {
    /// A frame was exported successfully.
    FrameSaved {
        /// Where the image was written.
        path: PathBuf,
    },
    /// Exporting a frame failed. Sub-causes are deliberately not
    /// distinguished.
    ExportFailed,
    /// Preparing, seeking or decoding the loaded media failed.
    PlaybackError {
        /// Human-readable description.
        message: String,
    },
}

impl Notice {
    /// The text a host should display.
    pub fn message(&self) -> String {
        match self {
            Notice::FrameSaved { .. } => "Frame saved successfully!".to_string(),
            Notice::ExportFailed => "Error saving frame.".to_string(),
            Notice::PlaybackError { message } => format!("Playback error: {message}"),
        }
    }

    /// `true` for failure notices.
    pub fn is_error(&self) -> bool {
        !matches!(self, Notice::FrameSaved { .. })
    }
}

/// Receives notices from the engine.
///
/// Implementations must be [`Send`] and [`Sync`] because exports may finish
/// on a blocking worker thread.
pub trait Notifier: Send + Sync {
    /// Show or record `notice`.
    fn notify(&self, notice: &Notice);
}

/// Default notifier that routes notices to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        if notice.is_error() {
            log::warn!("{}", notice.message());
        } else {
            log::info!("{}", notice.message());
        }
    }
}
