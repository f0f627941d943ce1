//! Per-frame face detections and the policy that turns them into a single
//! yaw observation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One face reported by the external detector for a single frame.
///
/// Only `yaw_angle` participates in checkpoint classification; the other
/// angles are carried through for logging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Rotation about the vertical axis, in degrees.
    pub yaw_angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_angle: Option<f64>,
}

impl DetectedFace {
    pub fn with_yaw(yaw_angle: f64) -> Self {
        Self {
            yaw_angle,
            pitch_angle: None,
            roll_angle: None,
        }
    }
}

/// How a frame's face list is reduced to at most one yaw angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacePolicy {
    /// Use the frame only when exactly one face is present.
    #[default]
    Single,
    /// Use the first face whenever at least one is present. Frames with
    /// several faces still count.
    First,
}

impl FacePolicy {
    /// Select the yaw angle to feed the tracker, or `None` if the frame
    /// should be treated as an absent observation.
    pub fn select(self, faces: &[DetectedFace]) -> Option<f64> {
        match (self, faces) {
            (FacePolicy::Single, [face]) => Some(face.yaw_angle),
            (FacePolicy::Single, _) => None,
            (FacePolicy::First, faces) => faces.first().map(|f| f.yaw_angle),
        }
    }
}

impl fmt::Display for FacePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FacePolicy::Single => "single",
            FacePolicy::First => "first",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown face policy '{0}' (expected single or first)")]
pub struct UnknownFacePolicy(pub String);

impl FromStr for FacePolicy {
    type Err = UnknownFacePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(FacePolicy::Single),
            "first" => Ok(FacePolicy::First),
            _ => Err(UnknownFacePolicy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faces(yaws: &[f64]) -> Vec<DetectedFace> {
        yaws.iter().copied().map(DetectedFace::with_yaw).collect()
    }

    #[test]
    fn test_single_policy_requires_exactly_one() {
        assert_eq!(FacePolicy::Single.select(&[]), None);
        assert_eq!(FacePolicy::Single.select(&faces(&[-3.0])), Some(-3.0));
        assert_eq!(FacePolicy::Single.select(&faces(&[-3.0, 40.0])), None);
    }

    #[test]
    fn test_first_policy_takes_first_face() {
        assert_eq!(FacePolicy::First.select(&[]), None);
        assert_eq!(FacePolicy::First.select(&faces(&[40.0])), Some(40.0));
        assert_eq!(FacePolicy::First.select(&faces(&[-37.0, 0.0])), Some(-37.0));
    }

    #[test]
    fn test_default_policy_is_single() {
        assert_eq!(FacePolicy::default(), FacePolicy::Single);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("first".parse::<FacePolicy>(), Ok(FacePolicy::First));
        assert_eq!("Single".parse::<FacePolicy>(), Ok(FacePolicy::Single));
        assert!("any".parse::<FacePolicy>().is_err());
    }

    #[test]
    fn test_face_deserializes_with_yaw_only() {
        let face: DetectedFace = serde_json::from_str(r#"{"yaw_angle": -3.2}"#).unwrap();
        assert_eq!(face, DetectedFace::with_yaw(-3.2));
    }
}
