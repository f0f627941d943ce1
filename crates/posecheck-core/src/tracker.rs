//! Checkpoint accumulation state machine for one liveness session.
//!
//! The tracker is the single source of truth for which checkpoints have been
//! satisfied. Display progress is derived from it on demand rather than kept
//! as a second copy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checkpoint::{Checkpoint, CheckpointSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
}

/// Why a session left the Recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// All four checkpoints were satisfied.
    Completed,
    /// The user pressed stop (or the host shut down) before completion.
    UserCancelled,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::UserCancelled => "user_cancelled",
        }
    }
}

/// Invalid state transitions. These indicate a caller bug, not bad input.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerError {
    #[error("session already recording")]
    AlreadyRecording,
    #[error("no session recording")]
    NotRecording,
}

/// What a single observation did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// No face, or the yaw fell outside every range.
    Ignored,
    /// The yaw matched a checkpoint that was already satisfied.
    Duplicate(Checkpoint),
    /// The yaw satisfied a checkpoint for the first time this session.
    Satisfied(Checkpoint),
}

#[derive(Debug, Default)]
pub struct CheckpointTracker {
    state: SessionState,
    checkpoints: CheckpointSet,
}

impl CheckpointTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn checkpoints(&self) -> &CheckpointSet {
        &self.checkpoints
    }

    /// Idle -> Recording with an empty checkpoint set.
    pub fn start(&mut self) -> Result<(), TrackerError> {
        if self.state == SessionState::Recording {
            return Err(TrackerError::AlreadyRecording);
        }
        self.checkpoints.clear();
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Feed one frame's yaw angle (`None` when no usable face was detected).
    pub fn observe(&mut self, yaw: Option<f64>) -> Result<ObserveOutcome, TrackerError> {
        if self.state != SessionState::Recording {
            return Err(TrackerError::NotRecording);
        }
        let Some(checkpoint) = yaw.and_then(Checkpoint::classify) else {
            return Ok(ObserveOutcome::Ignored);
        };
        if self.checkpoints.mark(checkpoint) {
            Ok(ObserveOutcome::Satisfied(checkpoint))
        } else {
            Ok(ObserveOutcome::Duplicate(checkpoint))
        }
    }

    pub fn is_complete(&self) -> bool {
        self.checkpoints.is_complete()
    }

    /// Recording -> Idle, discarding the checkpoint set.
    pub fn stop(&mut self, reason: StopReason) -> Result<StopReason, TrackerError> {
        if self.state != SessionState::Recording {
            return Err(TrackerError::NotRecording);
        }
        self.checkpoints.clear();
        self.state = SessionState::Idle;
        Ok(reason)
    }

    /// Satisfied fraction while Recording, `None` while Idle.
    pub fn progress(&self) -> Option<f32> {
        match self.state {
            SessionState::Recording => Some(self.checkpoints.progress()),
            SessionState::Idle => None,
        }
    }
}
