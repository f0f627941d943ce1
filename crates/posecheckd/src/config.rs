use std::path::PathBuf;
use std::time::Duration;

use posecheck_core::{CaptureOptions, FacePolicy, Flash};

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory where finished capture manifests are written.
    pub recordings_dir: PathBuf,
    /// Delay between session start and the capture actually starting.
    pub capture_delay: Duration,
    /// Maximum observations per second passed to the tracker (0 = unlimited).
    pub frame_rate: u32,
    /// How multi-face frames are reduced to one yaw angle.
    pub face_policy: FacePolicy,
    /// Flash mode requested from the capture controller.
    pub flash: Flash,
    /// Whether the daemon is running on the session bus (development mode).
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `POSECHECK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let recordings_dir = lookup("POSECHECK_RECORDINGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                lookup("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| {
                        let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("posecheck/recordings")
            });

        Self {
            recordings_dir,
            capture_delay: Duration::from_millis(parse_or(
                &lookup,
                "POSECHECK_CAPTURE_DELAY_MS",
                1000,
            )),
            frame_rate: parse_or(&lookup, "POSECHECK_FRAME_RATE", 15),
            face_policy: parse_or(&lookup, "POSECHECK_FACE_POLICY", FacePolicy::Single),
            flash: parse_or(&lookup, "POSECHECK_FLASH", Flash::On),
            session_bus: lookup("POSECHECK_SESSION_BUS").is_some_and(|v| is_truthy(&v)),
        }
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            flash: self.flash,
            ..CaptureOptions::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value, using default");
            default
        }),
        None => default,
    }
}

/// Same reading of a flag as the CLI's `--session` env fallback: unset,
/// empty, `0`, `false`, `no`, `off`, `n` and `f` are off; anything else is on.
fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off" | "n" | "f"
    )
}
