//! Head-orientation checkpoints and the fixed yaw ranges that satisfy them.
//!
//! The ranges are asymmetric, non-overlapping, and leave wide unclassified
//! bands (nothing between -35 and -4, nothing between 1 and 35). They must
//! stay exactly as they are: changing them changes which head movements
//! complete a check.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four head-orientation targets a user must hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checkpoint {
    Top,
    Bottom,
    Left,
    Right,
}

/// Number of checkpoints required to complete a session.
pub const CHECKPOINT_COUNT: usize = 4;

impl Checkpoint {
    pub const ALL: [Checkpoint; CHECKPOINT_COUNT] = [
        Checkpoint::Top,
        Checkpoint::Bottom,
        Checkpoint::Left,
        Checkpoint::Right,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Checkpoint::Top => "top",
            Checkpoint::Bottom => "bottom",
            Checkpoint::Left => "left",
            Checkpoint::Right => "right",
        }
    }

    /// Classify a yaw angle (degrees, signed) into at most one checkpoint.
    ///
    /// The angle is first rounded to the nearest integer with halves going
    /// toward positive infinity (`-3.5` becomes `-3`), then matched against
    /// the inclusive ranges:
    ///
    /// | rounded yaw  | checkpoint |
    /// |--------------|------------|
    /// | `-1 ..= 0`   | bottom     |
    /// | `-4 ..= -3`  | top        |
    /// | `-40 ..= -35`| right      |
    /// | `36 ..`      | left       |
    ///
    /// Anything else, including NaN and infinities, classifies to `None`.
    pub fn classify(yaw_degrees: f64) -> Option<Checkpoint> {
        let rounded = round_half_up(yaw_degrees)?;
        match rounded {
            -1..=0 => Some(Checkpoint::Bottom),
            -4..=-3 => Some(Checkpoint::Top),
            -40..=-35 => Some(Checkpoint::Right),
            36.. => Some(Checkpoint::Left),
            _ => None,
        }
    }
}

/// Round half toward positive infinity. Returns `None` for non-finite input.
fn round_half_up(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    // Saturating cast: huge magnitudes land on i64::MIN/MAX which still
    // classify correctly (left for large positive, none for large negative).
    Some((value + 0.5).floor() as i64)
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown checkpoint '{0}' (expected top, bottom, left or right)")]
pub struct UnknownCheckpoint(pub String);

impl FromStr for Checkpoint {
    type Err = UnknownCheckpoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Checkpoint::ALL
            .into_iter()
            .find(|cp| cp.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCheckpoint(s.to_string()))
    }
}

/// The set of checkpoints satisfied during one session.
///
/// An explicit boolean per checkpoint rather than a dynamic map: the size is
/// bounded to the four known names by construction. Entries are only ever
/// set by [`mark`](Self::mark) and only ever cleared all at once by
/// [`clear`](Self::clear).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckpointSet {
    top: bool,
    bottom: bool,
    left: bool,
    right: bool,
}

impl CheckpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, checkpoint: Checkpoint) -> &mut bool {
        match checkpoint {
            Checkpoint::Top => &mut self.top,
            Checkpoint::Bottom => &mut self.bottom,
            Checkpoint::Left => &mut self.left,
            Checkpoint::Right => &mut self.right,
        }
    }

    /// Mark a checkpoint satisfied. Returns `true` only if it was not
    /// satisfied before.
    pub fn mark(&mut self, checkpoint: Checkpoint) -> bool {
        let slot = self.slot(checkpoint);
        let newly = !*slot;
        *slot = true;
        newly
    }

    pub fn contains(&self, checkpoint: Checkpoint) -> bool {
        match checkpoint {
            Checkpoint::Top => self.top,
            Checkpoint::Bottom => self.bottom,
            Checkpoint::Left => self.left,
            Checkpoint::Right => self.right,
        }
    }

    /// Satisfied checkpoints, in [`Checkpoint::ALL`] order.
    pub fn satisfied(&self) -> impl Iterator<Item = Checkpoint> + '_ {
        Checkpoint::ALL.into_iter().filter(move |cp| self.contains(*cp))
    }

    pub fn len(&self) -> usize {
        self.satisfied().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.len() == CHECKPOINT_COUNT
    }

    /// Fraction of checkpoints satisfied, in `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        self.len() as f32 / CHECKPOINT_COUNT as f32
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
