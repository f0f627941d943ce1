use posecheck_core::{DetectedFace, FacePolicy, SessionEvent};
use tokio::sync::mpsc;
use zbus::interface;
use zbus::object_server::SignalEmitter;

use crate::engine::{EngineError, EngineHandle};

pub const BUS_NAME: &str = "org.freedesktop.PoseCheck1";
pub const OBJECT_PATH: &str = "/org/freedesktop/PoseCheck1";

/// D-Bus interface for the PoseCheck liveness daemon.
///
/// Bus name: org.freedesktop.PoseCheck1
/// Object path: /org/freedesktop/PoseCheck1
pub struct PoseCheckService {
    pub engine: EngineHandle,
    pub face_policy: FacePolicy,
    pub frame_rate: u32,
}

fn to_fdo(op: &'static str) -> impl Fn(EngineError) -> zbus::fdo::Error {
    move |e| {
        tracing::warn!(error = %e, op, "request rejected");
        zbus::fdo::Error::Failed(e.to_string())
    }
}

#[interface(name = "org.freedesktop.PoseCheck1")]
impl PoseCheckService {
    /// Start a liveness session. Returns the session generation.
    async fn start(&self) -> zbus::fdo::Result<u64> {
        tracing::info!("start requested");
        self.engine.start().await.map_err(to_fdo("start"))
    }

    /// Stop the current session on the user's behalf. No artifact is kept.
    async fn stop(&self) -> zbus::fdo::Result<()> {
        tracing::info!("stop requested");
        self.engine.stop().await.map_err(to_fdo("stop"))
    }

    /// Feed one frame: the yaw angle of every detected face, in detector order.
    ///
    /// Returns false if the frame was dropped by the frame-rate throttle.
    async fn observe(&self, yaw_angles: Vec<f64>) -> zbus::fdo::Result<bool> {
        let faces = yaw_angles.into_iter().map(DetectedFace::with_yaw).collect();
        self.engine.observe(faces).await.map_err(to_fdo("observe"))
    }

    /// Returns `(recording, progress)`; progress is 0.0 when not recording.
    async fn progress(&self) -> zbus::fdo::Result<(bool, f64)> {
        let snapshot = self.engine.snapshot().await.map_err(to_fdo("progress"))?;
        Ok(match snapshot.progress {
            Some(p) => (true, f64::from(p)),
            None => (false, 0.0),
        })
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.engine.snapshot().await.map_err(to_fdo("status"))?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "face_policy": self.face_policy.to_string(),
            "frame_rate": self.frame_rate,
            "session": snapshot,
        })
        .to_string())
    }

    #[zbus(signal)]
    async fn checkpoint_satisfied(
        emitter: &SignalEmitter<'_>,
        checkpoint: &str,
        progress: f64,
    ) -> zbus::Result<()>;

    /// Emitted on every stop with `completed` or `user_cancelled`.
    #[zbus(signal)]
    async fn stopped(emitter: &SignalEmitter<'_>, reason: &str) -> zbus::Result<()>;

    /// Emitted once a completed session's recording is finalized.
    #[zbus(signal)]
    async fn completed(emitter: &SignalEmitter<'_>, artifact: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn capture_failed(emitter: &SignalEmitter<'_>, message: &str) -> zbus::Result<()>;
}

/// Forward session events to bus signals until the session task ends.
pub async fn forward_events(
    conn: zbus::Connection,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    let emitter = match SignalEmitter::new(&conn, OBJECT_PATH) {
        Ok(emitter) => emitter,
        Err(e) => {
            tracing::error!(error = %e, "cannot create signal emitter");
            return;
        }
    };

    while let Some(event) = events.recv().await {
        let sent = match &event {
            SessionEvent::CheckpointSatisfied {
                checkpoint,
                progress,
            } => {
                PoseCheckService::checkpoint_satisfied(
                    &emitter,
                    checkpoint.name(),
                    f64::from(*progress),
                )
                .await
            }
            SessionEvent::Stopped { reason, .. } => {
                PoseCheckService::stopped(&emitter, reason.as_str()).await
            }
            SessionEvent::ArtifactReady { artifact, .. } => {
                PoseCheckService::completed(&emitter, &artifact.path.to_string_lossy()).await
            }
            SessionEvent::CaptureFailed { message, .. } => {
                PoseCheckService::capture_failed(&emitter, message).await
            }
            SessionEvent::Started { .. } | SessionEvent::CaptureStarted { .. } => continue,
        };
        if let Err(e) = sent {
            tracing::warn!(error = %e, ?event, "failed to emit signal");
        }
    }
    tracing::debug!("event forwarding finished");
}
