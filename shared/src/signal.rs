use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AppError, ErrorKind, MAX_PATTERN_SEGMENTS, MAX_PATTERN_SEGMENT_MS};

/// Wait/vibrate alternation used while a countdown is running.
pub const EMERGENCY_PATTERN_MS: &[u64] = &[0, 500, 200, 500, 200, 500];

/// Short double pulse confirming the ring link.
pub const RING_TEST_PATTERN_MS: &[u64] = &[0, 100, 100, 100];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("Vibration pattern is empty")]
    Empty,
    #[error("Vibration pattern has {len} segments (maximum {max})")]
    TooManySegments { len: usize, max: usize },
    #[error("Pattern segment {index} lasts {ms} ms (maximum {max} ms)")]
    SegmentTooLong { index: usize, ms: u64, max: u64 },
    #[error("Vibration pattern never vibrates")]
    Silent,
}

impl From<PatternError> for AppError {
    fn from(e: PatternError) -> Self {
        AppError::new(ErrorKind::InvalidConfiguration, e.to_string())
    }
}

/// Alternating wait/vibrate durations in milliseconds, starting with a wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct VibrationPattern(Vec<u64>);

impl VibrationPattern {
    pub fn new(segments: Vec<u64>) -> Result<Self, PatternError> {
        if segments.is_empty() {
            return Err(PatternError::Empty);
        }
        if segments.len() > MAX_PATTERN_SEGMENTS {
            return Err(PatternError::TooManySegments {
                len: segments.len(),
                max: MAX_PATTERN_SEGMENTS,
            });
        }
        if let Some((index, &ms)) = segments
            .iter()
            .enumerate()
            .find(|(_, ms)| **ms > MAX_PATTERN_SEGMENT_MS)
        {
            return Err(PatternError::SegmentTooLong {
                index,
                ms,
                max: MAX_PATTERN_SEGMENT_MS,
            });
        }
        if segments.iter().skip(1).step_by(2).all(|ms| *ms == 0) {
            return Err(PatternError::Silent);
        }
        Ok(Self(segments))
    }

    /// A single pulse of `ms` milliseconds.
    pub fn pulse(ms: u64) -> Result<Self, PatternError> {
        Self::new(vec![0, ms])
    }

    #[must_use]
    pub fn emergency() -> Self {
        Self(EMERGENCY_PATTERN_MS.to_vec())
    }

    #[must_use]
    pub fn ring_test() -> Self {
        Self(RING_TEST_PATTERN_MS.to_vec())
    }

    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.0
    }

    #[must_use]
    pub fn cycle_ms(&self) -> u64 {
        self.0.iter().sum()
    }
}

impl Default for VibrationPattern {
    fn default() -> Self {
        Self::emergency()
    }
}

impl TryFrom<Vec<u64>> for VibrationPattern {
    type Error = PatternError;

    fn try_from(segments: Vec<u64>) -> Result<Self, Self::Error> {
        Self::new(segments)
    }
}

impl From<VibrationPattern> for Vec<u64> {
    fn from(pattern: VibrationPattern) -> Self {
        pattern.0
    }
}

/// What the shell plays: a pattern, optionally looped until cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSignal {
    pub pattern: VibrationPattern,
    pub repeat: bool,
}

impl AlertSignal {
    #[must_use]
    pub fn once(pattern: VibrationPattern) -> Self {
        Self {
            pattern,
            repeat: false,
        }
    }

    #[must_use]
    pub fn looping(pattern: VibrationPattern) -> Self {
        Self {
            pattern,
            repeat: true,
        }
    }
}

impl Default for AlertSignal {
    fn default() -> Self {
        Self::looping(VibrationPattern::emergency())
    }
}
