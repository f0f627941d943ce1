use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use posecheck_core::{Artifact, CaptureError, CaptureHandle, CaptureOptions, RecordingController};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("recordings directory {path}: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Completion report delivered back to the session task.
#[derive(Debug)]
pub enum CaptureEvent {
    Finished {
        handle: CaptureHandle,
        artifact: Artifact,
    },
    Failed {
        handle: CaptureHandle,
        message: String,
    },
}

/// What gets written for each finished capture.
#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureManifest {
    pub id: Uuid,
    pub handle: CaptureHandle,
    pub options: CaptureOptions,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
}

struct ActiveCapture {
    id: Uuid,
    options: CaptureOptions,
    started_at: DateTime<Utc>,
}

/// Recording controller that spools a JSON capture manifest per capture.
///
/// Stopping is asynchronous: `stop_capture` returns immediately and the
/// manifest is written on a background task, whose result arrives on the
/// channel handed to [`SpoolRecorder::new`].
pub struct SpoolRecorder {
    dir: PathBuf,
    next_handle: u64,
    active: HashMap<CaptureHandle, ActiveCapture>,
    events: mpsc::UnboundedSender<CaptureEvent>,
}

impl SpoolRecorder {
    /// Create the recordings directory if needed.
    pub fn new(
        dir: &Path,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<Self, RecorderError> {
        std::fs::create_dir_all(dir).map_err(|source| RecorderError::Dir {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            next_handle: 1,
            active: HashMap::new(),
            events,
        })
    }
}

impl RecordingController for SpoolRecorder {
    fn start_capture(&mut self, options: &CaptureOptions) -> Result<CaptureHandle, CaptureError> {
        let handle = CaptureHandle(self.next_handle);
        self.next_handle += 1;
        let id = Uuid::new_v4();
        self.active.insert(
            handle,
            ActiveCapture {
                id,
                options: *options,
                started_at: Utc::now(),
            },
        );
        tracing::debug!(%handle, %id, "spool capture opened");
        Ok(handle)
    }

    fn stop_capture(&mut self, handle: CaptureHandle) -> Result<Option<Artifact>, CaptureError> {
        let capture = self
            .active
            .remove(&handle)
            .ok_or(CaptureError::UnknownHandle(handle))?;

        let manifest = CaptureManifest {
            id: capture.id,
            handle,
            options: capture.options,
            started_at: capture.started_at,
            stopped_at: Utc::now(),
        };
        let dir = self.dir.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let event = match write_manifest(&dir, &manifest).await {
                Ok(path) => CaptureEvent::Finished {
                    handle,
                    artifact: Artifact { path },
                },
                Err(e) => {
                    tracing::error!(error = %e, %handle, "failed to write capture manifest");
                    CaptureEvent::Failed {
                        handle,
                        message: e.to_string(),
                    }
                }
            };
            // Session task gone means the daemon is shutting down.
            let _ = events.send(event);
        });

        Ok(None)
    }
}

/// Write the manifest next to its final name, then rename into place.
async fn write_manifest(dir: &Path, manifest: &CaptureManifest) -> Result<PathBuf, RecorderError> {
    let dest = dir.join(format!("{}.json", manifest.id));
    let tmp = dest.with_extension("json.part");
    let body = serde_json::to_vec_pretty(manifest)?;
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, &dest).await?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "posecheck-recorder-{tag}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[tokio::test]
    async fn test_stop_writes_manifest_asynchronously() {
        let dir = temp_dir("write");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut rec = SpoolRecorder::new(&dir, tx).unwrap();

        let handle = rec.start_capture(&CaptureOptions::default()).unwrap();
        assert_eq!(rec.stop_capture(handle).unwrap(), None);

        let event = rx.recv().await.unwrap();
        let CaptureEvent::Finished { handle: got, artifact } = event else {
            panic!("expected finished event");
        };
        assert_eq!(got, handle);

        let body = std::fs::read(&artifact.path).unwrap();
        let manifest: CaptureManifest = serde_json::from_slice(&body).unwrap();
        assert_eq!(manifest.handle, handle);
        assert!(manifest.stopped_at >= manifest.started_at);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_unknown_handle_rejected() {
        let dir = temp_dir("unknown");
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut rec = SpoolRecorder::new(&dir, tx).unwrap();
        let err = rec.stop_capture(CaptureHandle(42)).unwrap_err();
        assert!(matches!(err, CaptureError::UnknownHandle(CaptureHandle(42))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_handles_are_distinct() {
        let dir = temp_dir("handles");
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut rec = SpoolRecorder::new(&dir, tx).unwrap();
        let a = rec.start_capture(&CaptureOptions::default()).unwrap();
        let b = rec.start_capture(&CaptureOptions::default()).unwrap();
        assert_ne!(a, b);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
