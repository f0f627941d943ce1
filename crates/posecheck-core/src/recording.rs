//! Seam to the external video capture controller.
//!
//! The controller owns the camera and storage. The session only asks it to
//! start and stop, and learns about the finished artifact either from the
//! return value of [`RecordingController::stop_capture`] or, for
//! asynchronous controllers, from a later completion callback.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Opaque identifier of one capture, assigned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureHandle(pub u64);

impl fmt::Display for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capture-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flash {
    #[default]
    On,
    Off,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown flash mode '{0}' (expected on, off or auto)")]
pub struct UnknownFlash(pub String);

impl FromStr for Flash {
    type Err = UnknownFlash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "1" | "true" => Ok(Flash::On),
            "off" | "0" | "false" => Ok(Flash::Off),
            "auto" => Ok(Flash::Auto),
            _ => Err(UnknownFlash(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureOptions {
    pub flash: Flash,
    pub camera: CameraFacing,
}

/// A finished recording. Where it lives is up to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
    #[error("unknown capture {0}")]
    UnknownHandle(CaptureHandle),
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture failed: {0}")]
    Failed(String),
}

pub trait RecordingController {
    /// Begin recording. Must not block on hardware.
    fn start_capture(&mut self, options: &CaptureOptions) -> Result<CaptureHandle, CaptureError>;

    /// Request the capture to stop.
    ///
    /// `Ok(Some(artifact))` means the capture finished synchronously.
    /// `Ok(None)` means the result will be delivered later through the
    /// session's completion callbacks.
    fn stop_capture(&mut self, handle: CaptureHandle) -> Result<Option<Artifact>, CaptureError>;
}

impl<R: RecordingController + ?Sized> RecordingController for Box<R> {
    fn start_capture(&mut self, options: &CaptureOptions) -> Result<CaptureHandle, CaptureError> {
        (**self).start_capture(options)
    }

    fn stop_capture(&mut self, handle: CaptureHandle) -> Result<Option<Artifact>, CaptureError> {
        (**self).stop_capture(handle)
    }
}

/// Controller that records nothing and finishes every capture synchronously
/// with an artifact under `root`. Used for offline replays.
#[derive(Debug)]
pub struct NullRecorder {
    root: PathBuf,
    next_id: u64,
    active: Vec<CaptureHandle>,
}

impl NullRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_id: 1,
            active: Vec::new(),
        }
    }
}

impl RecordingController for NullRecorder {
    fn start_capture(&mut self, _options: &CaptureOptions) -> Result<CaptureHandle, CaptureError> {
        let handle = CaptureHandle(self.next_id);
        self.next_id += 1;
        self.active.push(handle);
        Ok(handle)
    }

    fn stop_capture(&mut self, handle: CaptureHandle) -> Result<Option<Artifact>, CaptureError> {
        let idx = self
            .active
            .iter()
            .position(|h| *h == handle)
            .ok_or(CaptureError::UnknownHandle(handle))?;
        self.active.swap_remove(idx);
        Ok(Some(Artifact {
            path: self.root.join(format!("{handle}.mp4")),
        }))
    }
}
