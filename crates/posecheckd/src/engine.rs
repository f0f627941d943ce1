use std::time::{Duration, Instant};

use posecheck_core::{
    CaptureHandle, Checkpoint, DetectedFace, LivenessSession, SessionEvent, SessionState,
    StopReason, TrackerError,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::recorder::{CaptureEvent, RecorderError, SpoolRecorder};
use crate::throttle::FrameThrottle;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),
    #[error("session task exited")]
    ChannelClosed,
}

/// Point-in-time view of the session, for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub generation: u64,
    pub satisfied: Vec<Checkpoint>,
    pub progress: Option<f32>,
    pub capture: Option<CaptureHandle>,
}

/// Messages sent to the session task.
enum EngineRequest {
    Start {
        reply: oneshot::Sender<Result<u64, EngineError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Observe {
        faces: Vec<DetectedFace>,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Delayed capture start for session `generation`.
    BeginCapture { generation: u64 },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the session task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Start a session. Returns its generation number.
    pub async fn start(&self) -> Result<u64, EngineError> {
        self.request(|reply| EngineRequest::Start { reply }).await?
    }

    /// User stop.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Stop { reply }).await?
    }

    /// Feed one frame's faces. `Ok(false)` means the frame was throttled.
    pub async fn observe(&self, faces: Vec<DetectedFace>) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Observe { faces, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        self.request(|reply| EngineRequest::Snapshot { reply }).await
    }

    /// Cancel any live session and end the task.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Shutdown { reply }).await
    }
}

/// Spawn the session task on the current runtime.
///
/// The task is the only owner of the session, so every request and every
/// capture completion is handled to the end before the next one is looked at.
/// Session events are published on the returned receiver.
pub fn spawn_engine(
    config: &Config,
) -> Result<(EngineHandle, mpsc::UnboundedReceiver<SessionEvent>), EngineError> {
    let (capture_tx, capture_rx) = mpsc::unbounded_channel();
    let recorder = SpoolRecorder::new(&config.recordings_dir, capture_tx)?;
    tracing::info!(dir = %config.recordings_dir.display(), "recordings directory ready");

    let session = LivenessSession::new(recorder, config.face_policy, config.capture_options());
    let (tx, rx) = mpsc::channel::<EngineRequest>(32);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let engine = Engine {
        session,
        throttle: FrameThrottle::new(config.frame_rate),
        capture_delay: config.capture_delay,
        self_tx: tx.downgrade(),
        events: events_tx,
    };
    tokio::spawn(engine.run(rx, capture_rx));

    Ok((EngineHandle { tx }, events_rx))
}

struct Engine {
    session: LivenessSession<SpoolRecorder>,
    throttle: FrameThrottle,
    capture_delay: Duration,
    /// Weak so the task still ends once every handle is dropped.
    self_tx: mpsc::WeakSender<EngineRequest>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Engine {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<EngineRequest>,
        mut capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    ) {
        tracing::info!(policy = %self.session.policy(), "session task started");
        loop {
            tokio::select! {
                req = rx.recv() => {
                    let Some(req) = req else { break };
                    if !self.handle_request(req) {
                        break;
                    }
                }
                Some(event) = capture_rx.recv() => self.handle_capture(event),
            }
        }
        tracing::info!("session task exiting");
    }

    /// Returns `false` when the task should exit.
    fn handle_request(&mut self, req: EngineRequest) -> bool {
        match req {
            EngineRequest::Start { reply } => {
                let _ = reply.send(self.start());
            }
            EngineRequest::Stop { reply } => {
                let result = self.session.cancel().map_err(EngineError::from);
                let _ = reply.send(result.map(|events| self.publish(events)));
            }
            EngineRequest::Observe { faces, reply } => {
                let _ = reply.send(self.observe(&faces));
            }
            EngineRequest::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            EngineRequest::BeginCapture { generation } => {
                let events = self.session.begin_capture(generation);
                self.publish(events);
            }
            EngineRequest::Shutdown { reply } => {
                if self.session.state() == SessionState::Recording {
                    if let Ok(events) = self.session.cancel() {
                        tracing::info!("cancelled live session for shutdown");
                        self.publish(events);
                    }
                }
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn start(&mut self) -> Result<u64, EngineError> {
        let events = self.session.start()?;
        self.publish(events);
        self.throttle.reset();

        let generation = self.session.generation();
        let delay = self.capture_delay;
        let weak = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(EngineRequest::BeginCapture { generation }).await;
            }
        });
        Ok(generation)
    }

    fn observe(&mut self, faces: &[DetectedFace]) -> Result<bool, EngineError> {
        if self.session.state() != SessionState::Recording {
            return Err(TrackerError::NotRecording.into());
        }
        if !self.throttle.admit(Instant::now()) {
            return Ok(false);
        }
        let events = self.session.observe(faces)?;
        if events
            .iter()
            .any(|e| matches!(e, SessionEvent::Stopped { reason: StopReason::Completed, .. }))
        {
            tracing::info!("all checkpoints satisfied");
        }
        self.publish(events);
        Ok(true)
    }

    fn handle_capture(&mut self, event: CaptureEvent) {
        let published = match event {
            CaptureEvent::Finished { handle, artifact } => {
                self.session.on_capture_finished(handle, artifact)
            }
            CaptureEvent::Failed { handle, message } => {
                Some(self.session.on_capture_failed(handle, message))
            }
        };
        self.publish(published);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.session.state(),
            generation: self.session.generation(),
            satisfied: self.session.checkpoints().satisfied().collect(),
            progress: self.session.progress(),
            capture: self.session.active_capture(),
        }
    }

    fn publish(&self, events: impl IntoIterator<Item = SessionEvent>) {
        for event in events {
            // No subscriber is fine; events are advisory.
            let _ = self.events.send(event);
        }
    }
}
