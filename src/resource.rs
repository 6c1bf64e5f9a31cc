//! Resource handles.
//!
//! A [`ResourceHandle`] is the opaque reference the host application hands to
//! the engine when the user picks a video. It is cheap to clone, never
//! mutated, and can be re-resolved at any time. The frame exporter does this on
//! every export instead of trusting that the original byte source is still
//! reachable.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::error::FrameStepError;

#[derive(Debug, PartialEq, Eq, Hash)]
enum Source {
    File(PathBuf),
    Url(String),
}

/// An immutable, revalidatable reference to a video byte source.
///
/// # Example
///
/// ```
/// use framestep::ResourceHandle;
///
/// let local = ResourceHandle::from_path("clips/run.mp4");
/// assert!(!local.is_remote());
///
/// let remote: ResourceHandle = "https://example.com/run.mp4".parse().unwrap();
/// assert!(remote.is_remote());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    source: Arc<Source>,
}

impl ResourceHandle {
    /// Reference a file on the local filesystem.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            source: Arc::new(Source::File(path.as_ref().to_path_buf())),
        }
    }

    /// Reference a URL understood by FFmpeg's protocol layer
    /// (`file://`, `http://`, `rtsp://`, ...).
    pub fn from_url<S: Into<String>>(url: S) -> Self {
        Self {
            source: Arc::new(Source::Url(url.into())),
        }
    }

    /// `true` when the handle points at a URL rather than a local file.
    pub fn is_remote(&self) -> bool {
        matches!(*self.source, Source::Url(_))
    }

    /// Resolve the handle to the location FFmpeg should open.
    ///
    /// Local files are revalidated on every call: a file that was moved or
    /// deleted since the handle was obtained yields
    /// [`FrameStepError::ResourceOpen`]. URLs are passed through untouched and
    /// validated by the demuxer when opened.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStepError::ResourceOpen`] if a local file no longer
    /// exists or is not a regular file.
    pub fn resolve(&self) -> Result<PathBuf, FrameStepError> {
        match &*self.source {
            Source::File(path) => {
                let metadata =
                    std::fs::metadata(path).map_err(|error| FrameStepError::ResourceOpen {
                        resource: self.to_string(),
                        reason: error.to_string(),
                    })?;
                if !metadata.is_file() {
                    return Err(FrameStepError::ResourceOpen {
                        resource: self.to_string(),
                        reason: "not a regular file".to_string(),
                    });
                }
                Ok(path.clone())
            }
            Source::Url(url) => Ok(PathBuf::from(url)),
        }
    }
}

impl Display for ResourceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &*self.source {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Url(url) => f.write_str(url),
        }
    }
}

impl FromStr for ResourceHandle {
    type Err = FrameStepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(FrameStepError::ResourceOpen {
                resource: String::new(),
                reason: "empty resource reference".to_string(),
            });
        }
        if trimmed.contains("://") {
            Ok(Self::from_url(trimmed))
        } else {
            Ok(Self::from_path(trimmed))
        }
    }
}

impl From<PathBuf> for ResourceHandle {
    fn from(path: PathBuf) -> Self {
        Self::from_path(path)
    }
}

impl From<&Path> for ResourceHandle {
    fn from(path: &Path) -> Self {
        Self::from_path(path)
    }
}
