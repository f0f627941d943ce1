//! A liveness session: the checkpoint tracker driving a recording controller.
//!
//! Every operation returns the events it produced so the host can forward
//! them to its UI or bus without the session knowing about either. The
//! session is not `Sync`-shared; the host owns it from a single task.
//!
//! Capture stop is fire-and-forget. The session records why each capture was
//! stopped and consults that when the controller later reports the finished
//! artifact: captures stopped by the user never produce an artifact event,
//! however late their completion arrives.

use std::collections::HashMap;

use serde::Serialize;

use crate::checkpoint::{Checkpoint, CheckpointSet};
use crate::face::{DetectedFace, FacePolicy};
use crate::recording::{Artifact, CaptureHandle, CaptureOptions, RecordingController};
use crate::tracker::{CheckpointTracker, ObserveOutcome, SessionState, StopReason, TrackerError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        generation: u64,
    },
    CaptureStarted {
        handle: CaptureHandle,
    },
    CheckpointSatisfied {
        checkpoint: Checkpoint,
        progress: f32,
    },
    Stopped {
        reason: StopReason,
        capture: Option<CaptureHandle>,
    },
    /// A capture stopped by completion has been finalized.
    ArtifactReady {
        handle: CaptureHandle,
        artifact: Artifact,
    },
    /// Capture trouble, for the user only. Never affects checkpoint state.
    CaptureFailed {
        handle: Option<CaptureHandle>,
        message: String,
    },
}

pub struct LivenessSession<R> {
    tracker: CheckpointTracker,
    recorder: R,
    policy: FacePolicy,
    options: CaptureOptions,
    generation: u64,
    active: Option<CaptureHandle>,
    /// Captures asked to stop whose completion has not arrived yet, with
    /// the generation that stopped them.
    finishing: HashMap<CaptureHandle, (StopReason, u64)>,
}

impl<R: RecordingController> LivenessSession<R> {
    pub fn new(recorder: R, policy: FacePolicy, options: CaptureOptions) -> Self {
        Self {
            tracker: CheckpointTracker::new(),
            recorder,
            policy,
            options,
            generation: 0,
            active: None,
            finishing: HashMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.tracker.state()
    }

    pub fn checkpoints(&self) -> &CheckpointSet {
        self.tracker.checkpoints()
    }

    pub fn progress(&self) -> Option<f32> {
        self.tracker.progress()
    }

    pub fn is_complete(&self) -> bool {
        self.tracker.is_complete()
    }

    /// Incremented on every start; identifies the current session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_capture(&self) -> Option<CaptureHandle> {
        self.active
    }

    pub fn policy(&self) -> FacePolicy {
        self.policy
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut R {
        &mut self.recorder
    }

    /// Enter Recording. The capture itself starts on
    /// [`begin_capture`](Self::begin_capture).
    pub fn start(&mut self) -> Result<Vec<SessionEvent>, TrackerError> {
        self.tracker.start()?;
        self.generation += 1;

        // Only the previous session's capture may still legitimately report
        // back; anything older was never answered and is dropped.
        let oldest = self.generation.saturating_sub(1);
        self.finishing.retain(|handle, (_, generation)| {
            let keep = *generation >= oldest;
            if !keep {
                tracing::debug!(%handle, generation = *generation, "dropping unanswered capture stop");
            }
            keep
        });
        tracing::info!(generation = self.generation, "liveness session started");
        Ok(vec![SessionEvent::Started {
            generation: self.generation,
        }])
    }

    /// Start the underlying capture for session `generation`.
    ///
    /// Does nothing if that session has already ended or already has a
    /// capture, so a delayed call racing a stop is harmless.
    pub fn begin_capture(&mut self, generation: u64) -> Vec<SessionEvent> {
        if generation != self.generation
            || self.state() != SessionState::Recording
            || self.active.is_some()
        {
            tracing::debug!(generation, current = self.generation, "stale capture start skipped");
            return Vec::new();
        }

        match self.recorder.start_capture(&self.options) {
            Ok(handle) => {
                tracing::info!(%handle, generation, "capture started");
                self.active = Some(handle);
                vec![SessionEvent::CaptureStarted { handle }]
            }
            Err(e) => {
                tracing::warn!(error = %e, generation, "capture failed to start");
                vec![SessionEvent::CaptureFailed {
                    handle: None,
                    message: e.to_string(),
                }]
            }
        }
    }

    /// Feed one frame's detected faces.
    pub fn observe(&mut self, faces: &[DetectedFace]) -> Result<Vec<SessionEvent>, TrackerError> {
        self.observe_yaw(self.policy.select(faces))
    }

    /// Feed one frame's yaw angle directly (`None` for no usable face).
    pub fn observe_yaw(&mut self, yaw: Option<f64>) -> Result<Vec<SessionEvent>, TrackerError> {
        let outcome = self.tracker.observe(yaw)?;
        let ObserveOutcome::Satisfied(checkpoint) = outcome else {
            return Ok(Vec::new());
        };

        let progress = self.tracker.checkpoints().progress();
        tracing::debug!(?yaw, %checkpoint, progress, "checkpoint satisfied");
        let mut events = vec![SessionEvent::CheckpointSatisfied {
            checkpoint,
            progress,
        }];

        if self.tracker.is_complete() {
            events.extend(self.finish(StopReason::Completed)?);
        }
        Ok(events)
    }

    /// User-initiated stop. Safe at any point while Recording, including
    /// before the capture has started.
    pub fn cancel(&mut self) -> Result<Vec<SessionEvent>, TrackerError> {
        self.finish(StopReason::UserCancelled)
    }

    fn finish(&mut self, reason: StopReason) -> Result<Vec<SessionEvent>, TrackerError> {
        self.tracker.stop(reason)?;
        let capture = self.active.take();
        tracing::info!(
            generation = self.generation,
            reason = reason.as_str(),
            capture = ?capture,
            "liveness session stopped"
        );

        let mut events = vec![SessionEvent::Stopped { reason, capture }];
        let Some(handle) = capture else {
            return Ok(events);
        };

        match self.recorder.stop_capture(handle) {
            Ok(Some(artifact)) => events.extend(self.settle(handle, reason, artifact)),
            Ok(None) => {
                self.finishing.insert(handle, (reason, self.generation));
            }
            Err(e) => {
                tracing::warn!(error = %e, %handle, "capture failed to stop");
                events.push(SessionEvent::CaptureFailed {
                    handle: Some(handle),
                    message: e.to_string(),
                });
            }
        }
        Ok(events)
    }

    fn settle(
        &self,
        handle: CaptureHandle,
        reason: StopReason,
        artifact: Artifact,
    ) -> Option<SessionEvent> {
        match reason {
            StopReason::Completed => {
                tracing::info!(%handle, path = %artifact.path.display(), "artifact ready");
                Some(SessionEvent::ArtifactReady { handle, artifact })
            }
            StopReason::UserCancelled => {
                tracing::debug!(%handle, "capture finished after user stop; suppressed");
                None
            }
        }
    }

    /// The controller finished a capture asynchronously.
    pub fn on_capture_finished(
        &mut self,
        handle: CaptureHandle,
        artifact: Artifact,
    ) -> Option<SessionEvent> {
        if let Some((reason, _)) = self.finishing.remove(&handle) {
            return self.settle(handle, reason, artifact);
        }
        if self.active == Some(handle) {
            // Ended without being asked to; the session keeps recording
            // but nothing it captured can be trusted as complete.
            tracing::warn!(%handle, "capture ended unexpectedly while recording");
            self.active = None;
        } else {
            tracing::warn!(%handle, "completion for unknown capture ignored");
        }
        None
    }

    /// The controller reported a capture error.
    pub fn on_capture_failed(&mut self, handle: CaptureHandle, message: String) -> SessionEvent {
        self.finishing.remove(&handle);
        if self.active == Some(handle) {
            self.active = None;
        }
        tracing::warn!(%handle, message = %message, "capture error");
        SessionEvent::CaptureFailed {
            handle: Some(handle),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{CaptureError, NullRecorder};
    use std::path::PathBuf;

    /// Controller whose captures complete only when the test says so.
    #[derive(Default)]
    struct DeferredRecorder {
        next: u64,
        stopped: Vec<CaptureHandle>,
        fail_start: bool,
    }

    impl RecordingController for DeferredRecorder {
        fn start_capture(&mut self, _: &CaptureOptions) -> Result<CaptureHandle, CaptureError> {
            if self.fail_start {
                return Err(CaptureError::Unavailable("camera busy".into()));
            }
            self.next += 1;
            Ok(CaptureHandle(self.next))
        }

        fn stop_capture(&mut self, handle: CaptureHandle) -> Result<Option<Artifact>, CaptureError> {
            self.stopped.push(handle);
            Ok(None)
        }
    }

    fn artifact(name: &str) -> Artifact {
        Artifact {
            path: PathBuf::from(name),
        }
    }

    fn started<R: RecordingController>(recorder: R) -> LivenessSession<R> {
        let mut s = LivenessSession::new(recorder, FacePolicy::Single, CaptureOptions::default());
        let generation = match s.start().unwrap().as_slice() {
            [SessionEvent::Started { generation }] => *generation,
            other => panic!("unexpected events {other:?}"),
        };
        s.begin_capture(generation);
        s
    }

    fn face(yaw: f64) -> Vec<DetectedFace> {
        vec![DetectedFace::with_yaw(yaw)]
    }

    #[test]
    fn test_scenario_full_sequence_completes() {
        let mut s = started(NullRecorder::new("/tmp/rec"));
        let mut all = Vec::new();
        for yaw in [0.0, -3.0, -36.0, -37.0, 40.0] {
            all.extend(s.observe(&face(yaw)).unwrap());
        }

        let satisfied: Vec<_> = all
            .iter()
            .filter_map(|e| match e {
                SessionEvent::CheckpointSatisfied { checkpoint, .. } => Some(*checkpoint),
                _ => None,
            })
            .collect();
        assert_eq!(
            satisfied,
            vec![Checkpoint::Bottom, Checkpoint::Top, Checkpoint::Right, Checkpoint::Left]
        );
        assert!(all.contains(&SessionEvent::Stopped {
            reason: StopReason::Completed,
            capture: Some(CaptureHandle(1)),
        }));
        assert!(all.contains(&SessionEvent::ArtifactReady {
            handle: CaptureHandle(1),
            artifact: artifact("/tmp/rec/capture-1.mp4"),
        }));
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.checkpoints().is_empty());
        assert_eq!(s.progress(), None);
    }

    #[test]
    fn test_auto_stop_fires_on_fourth_distinct_checkpoint() {
        let mut s = started(NullRecorder::new("/tmp/rec"));
        for yaw in [0.0, -3.0, -37.0] {
            s.observe(&face(yaw)).unwrap();
        }
        assert_eq!(s.state(), SessionState::Recording);
        let events = s.observe(&face(36.0)).unwrap();
        assert!(matches!(
            events.as_slice(),
            [
                SessionEvent::CheckpointSatisfied { checkpoint: Checkpoint::Left, .. },
                SessionEvent::Stopped { reason: StopReason::Completed, .. },
                SessionEvent::ArtifactReady { .. },
            ]
        ));
    }

    #[test]
    fn test_scenario_cancel_suppresses_late_completion() {
        let mut s = started(DeferredRecorder::default());
        let events = s.cancel().unwrap();
        assert_eq!(
            events,
            vec![SessionEvent::Stopped {
                reason: StopReason::UserCancelled,
                capture: Some(CaptureHandle(1)),
            }]
        );
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.checkpoints().is_empty());
        assert_eq!(s.recorder().stopped, vec![CaptureHandle(1)]);

        assert_eq!(s.on_capture_finished(CaptureHandle(1), artifact("late.mp4")), None);
    }

    #[test]
    fn test_late_cancelled_completion_suppressed_after_restart() {
        let mut s = started(DeferredRecorder::default());
        s.cancel().unwrap();
        let generation = s.generation();
        s.start().unwrap();
        s.begin_capture(generation + 1);
        assert_eq!(s.active_capture(), Some(CaptureHandle(2)));

        // Old capture's completion arrives while the new session records.
        assert_eq!(s.on_capture_finished(CaptureHandle(1), artifact("old.mp4")), None);
        assert_eq!(s.active_capture(), Some(CaptureHandle(2)));
    }

    #[test]
    fn test_deferred_completion_after_complete_yields_artifact() {
        let mut s = started(DeferredRecorder::default());
        for yaw in [0.0, -3.0, -37.0, 40.0] {
            s.observe(&face(yaw)).unwrap();
        }
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(
            s.on_capture_finished(CaptureHandle(1), artifact("done.mp4")),
            Some(SessionEvent::ArtifactReady {
                handle: CaptureHandle(1),
                artifact: artifact("done.mp4"),
            })
        );
        // A second report for the same capture is not trusted again.
        assert_eq!(s.on_capture_finished(CaptureHandle(1), artifact("done.mp4")), None);
    }

    #[test]
    fn test_unanswered_stops_do_not_accumulate() {
        let mut s = LivenessSession::new(
            DeferredRecorder::default(),
            FacePolicy::Single,
            CaptureOptions::default(),
        );
        for _ in 0..5 {
            s.start().unwrap();
            s.begin_capture(s.generation());
            s.cancel().unwrap();
        }
        // Each start already dropped stops older than the previous session.
        assert_eq!(s.finishing.len(), 2);
        assert!(s.finishing.contains_key(&CaptureHandle(4)));

        s.start().unwrap();
        // Only capture 5, from the session just before, is still awaited.
        assert_eq!(s.finishing.len(), 1);
        assert!(s.finishing.contains_key(&CaptureHandle(5)));
    }

    #[test]
    fn test_previous_completed_artifact_survives_restart() {
        let mut s = started(DeferredRecorder::default());
        for yaw in [0.0, -3.0, -37.0, 40.0] {
            s.observe(&face(yaw)).unwrap();
        }
        s.start().unwrap();
        assert!(matches!(
            s.on_capture_finished(CaptureHandle(1), artifact("done.mp4")),
            Some(SessionEvent::ArtifactReady { .. })
        ));
    }

    #[test]
    fn test_cancel_before_capture_starts() {
        let mut s = LivenessSession::new(
            DeferredRecorder::default(),
            FacePolicy::Single,
            CaptureOptions::default(),
        );
        s.start().unwrap();
        let generation = s.generation();
        let events = s.cancel().unwrap();
        assert_eq!(
            events,
            vec![SessionEvent::Stopped {
                reason: StopReason::UserCancelled,
                capture: None,
            }]
        );
        // The delayed start for the cancelled session must not capture.
        assert!(s.begin_capture(generation).is_empty());
        assert_eq!(s.active_capture(), None);
        assert!(s.recorder().stopped.is_empty());
    }

    #[test]
    fn test_scenario_absent_faces_no_change() {
        let mut s = started(NullRecorder::new("/tmp/rec"));
        assert!(s.observe(&[]).unwrap().is_empty());
        assert!(s.checkpoints().is_empty());
        assert_eq!(s.state(), SessionState::Recording);
    }

    #[test]
    fn test_multiple_faces_ignored_under_single_policy() {
        let mut s = started(NullRecorder::new("/tmp/rec"));
        let faces = vec![DetectedFace::with_yaw(0.0), DetectedFace::with_yaw(-3.0)];
        assert!(s.observe(&faces).unwrap().is_empty());
        assert!(s.checkpoints().is_empty());
    }

    #[test]
    fn test_first_policy_uses_first_of_many() {
        let mut s = LivenessSession::new(
            NullRecorder::new("/tmp/rec"),
            FacePolicy::First,
            CaptureOptions::default(),
        );
        s.start().unwrap();
        let faces = vec![DetectedFace::with_yaw(0.0), DetectedFace::with_yaw(-3.0)];
        let events = s.observe(&faces).unwrap();
        assert_eq!(
            events,
            vec![SessionEvent::CheckpointSatisfied {
                checkpoint: Checkpoint::Bottom,
                progress: 0.25,
            }]
        );
    }

    #[test]
    fn test_repeat_observation_emits_nothing() {
        let mut s = started(NullRecorder::new("/tmp/rec"));
        assert_eq!(s.observe(&face(-3.0)).unwrap().len(), 1);
        assert!(s.observe(&face(-3.0)).unwrap().is_empty());
        assert!(s.observe(&face(-4.2)).unwrap().is_empty());
        assert_eq!(s.progress(), Some(0.25));
    }

    #[test]
    fn test_observe_while_idle_is_precondition_violation() {
        let mut s = LivenessSession::new(
            NullRecorder::new("/tmp/rec"),
            FacePolicy::Single,
            CaptureOptions::default(),
        );
        assert_eq!(s.observe(&face(0.0)), Err(TrackerError::NotRecording));
        assert_eq!(s.cancel(), Err(TrackerError::NotRecording));
    }

    #[test]
    fn test_start_while_recording_rejected() {
        let mut s = started(NullRecorder::new("/tmp/rec"));
        assert_eq!(s.start(), Err(TrackerError::AlreadyRecording));
        assert_eq!(s.generation(), 1);
    }

    #[test]
    fn test_capture_start_failure_keeps_session_recording() {
        let recorder = DeferredRecorder {
            fail_start: true,
            ..Default::default()
        };
        let mut s = LivenessSession::new(recorder, FacePolicy::Single, CaptureOptions::default());
        s.start().unwrap();
        let events = s.begin_capture(s.generation());
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::CaptureFailed { handle: None, .. }]
        ));
        assert_eq!(s.state(), SessionState::Recording);

        s.observe(&face(0.0)).unwrap();
        assert_eq!(s.progress(), Some(0.25));
    }

    #[test]
    fn test_capture_error_does_not_touch_checkpoints() {
        let mut s = started(DeferredRecorder::default());
        s.observe(&face(-3.0)).unwrap();
        let event = s.on_capture_failed(CaptureHandle(1), "disk full".into());
        assert_eq!(
            event,
            SessionEvent::CaptureFailed {
                handle: Some(CaptureHandle(1)),
                message: "disk full".into(),
            }
        );
        assert_eq!(s.state(), SessionState::Recording);
        assert_eq!(s.progress(), Some(0.25));
        assert_eq!(s.active_capture(), None);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = SessionEvent::Stopped {
            reason: StopReason::UserCancelled,
            capture: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "stopped");
        assert_eq!(json["reason"], "user_cancelled");
    }
}
