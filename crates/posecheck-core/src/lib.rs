//! PoseCheck core: guided head-pose liveness check.
//!
//! A user is asked to turn their head through four checkpoints while the
//! front camera records. Each frame's face detection is reduced to one yaw
//! angle, classified against fixed ranges, and accumulated until all four
//! checkpoints are satisfied or the user stops.

pub mod checkpoint;
pub mod face;
pub mod recording;
pub mod session;
pub mod tracker;

pub use checkpoint::{Checkpoint, CheckpointSet, CHECKPOINT_COUNT};
pub use face::{DetectedFace, FacePolicy};
pub use recording::{
    Artifact, CameraFacing, CaptureError, CaptureHandle, CaptureOptions, Flash, NullRecorder,
    RecordingController, UnknownFlash,
};
pub use session::{LivenessSession, SessionEvent};
pub use tracker::{CheckpointTracker, ObserveOutcome, SessionState, StopReason, TrackerError};
