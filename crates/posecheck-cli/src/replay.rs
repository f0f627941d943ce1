//! `posecheck replay` — run a recorded yaw script through an in-process session.
//!
//! One frame per line:
//!
//! ```text
//! # comment
//! -3.2                          one face with this yaw
//! [{"yaw_angle": 40.1}]         detector output as JSON
//! []                            no face
//! ```
//!
//! An empty line is also a frame with no face.

use anyhow::{Context, Result};
use posecheck_core::{
    CaptureOptions, DetectedFace, FacePolicy, LivenessSession, NullRecorder, SessionEvent,
    SessionState,
};
use std::path::Path;

/// Parse one script line. `Ok(None)` for comment lines.
pub fn parse_line(line: &str) -> Result<Option<Vec<DetectedFace>>> {
    let line = line.trim();
    if line.starts_with('#') {
        return Ok(None);
    }
    if line.is_empty() {
        return Ok(Some(Vec::new()));
    }
    if line.starts_with('[') {
        let faces = serde_json::from_str(line).context("invalid face list")?;
        return Ok(Some(faces));
    }
    let yaw: f64 = line
        .parse()
        .with_context(|| format!("not a yaw angle: {line}"))?;
    Ok(Some(vec![DetectedFace::with_yaw(yaw)]))
}

pub fn parse_script(text: &str) -> Result<Vec<Vec<DetectedFace>>> {
    let mut frames = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(faces) = parse_line(line).with_context(|| format!("line {}", i + 1))? {
            frames.push(faces);
        }
    }
    Ok(frames)
}

pub struct ReplayReport {
    pub events: Vec<SessionEvent>,
    /// Frames fed to the session before it stopped.
    pub frames_used: usize,
    pub completed: bool,
}

/// Start a session, feed every frame until it completes, and cancel it if
/// the script runs out first.
pub fn replay(frames: &[Vec<DetectedFace>], policy: FacePolicy) -> Result<ReplayReport> {
    let mut session = LivenessSession::new(
        NullRecorder::new("replay"),
        policy,
        CaptureOptions::default(),
    );
    let mut events = session.start()?;
    events.extend(session.begin_capture(session.generation()));

    let mut frames_used = 0;
    for faces in frames {
        if session.state() != SessionState::Recording {
            break;
        }
        events.extend(session.observe(faces)?);
        frames_used += 1;
    }

    let completed = session.state() == SessionState::Idle;
    if !completed {
        events.extend(session.cancel()?);
    }

    Ok(ReplayReport {
        events,
        frames_used,
        completed,
    })
}

pub fn run(path: &Path, policy: FacePolicy) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let frames = parse_script(&text)?;
    tracing::debug!(frames = frames.len(), %policy, "replaying script");

    let report = replay(&frames, policy)?;
    for event in &report.events {
        println!("{}", serde_json::to_string(event)?);
    }
    println!();
    if report.completed {
        println!(
            "Liveness check complete after {} of {} frame(s).",
            report.frames_used,
            frames.len()
        );
    } else {
        println!(
            "Liveness check incomplete: script ended after {} frame(s).",
            frames.len()
        );
    }
    Ok(())
}
