use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::signal::{AlertSignal, PatternError, VibrationPattern};
use crate::{
    AppError, ErrorKind, DEFAULT_COUNTDOWN_SECONDS, DEFAULT_MAX_HISTORY,
    DEFAULT_PRESS_FEEDBACK_MS, MAX_COUNTDOWN_SECONDS, TICK_INTERVAL_MS,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Countdown of {value} seconds is outside 1..={max}")]
    CountdownOutOfRange { value: u32, max: u32 },
    #[error("Press feedback of {value} ms is outside 1..={max} ms")]
    PressFeedbackOutOfRange { value: u64, max: u64 },
    #[error("Alert history must keep at least one entry")]
    HistoryLimitZero,
    #[error("Invalid alert pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("Malformed trigger configuration: {0}")]
    Parse(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::InvalidConfiguration, e.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Tunables for the emergency countdown. Missing fields take their defaults;
/// unknown fields are rejected. The tick period and the looping of the
/// alerting signal are fixed and not configurable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerConfig {
    pub countdown_seconds: u32,
    pub alert_pattern: VibrationPattern,
    pub press_feedback_ms: u64,
    pub max_history: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: DEFAULT_COUNTDOWN_SECONDS,
            alert_pattern: VibrationPattern::emergency(),
            press_feedback_ms: DEFAULT_PRESS_FEEDBACK_MS,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

impl TriggerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.countdown_seconds == 0 || self.countdown_seconds > MAX_COUNTDOWN_SECONDS {
            return Err(ConfigError::CountdownOutOfRange {
                value: self.countdown_seconds,
                max: MAX_COUNTDOWN_SECONDS,
            });
        }
        if self.press_feedback_ms == 0 || self.press_feedback_ms > crate::MAX_PATTERN_SEGMENT_MS {
            return Err(ConfigError::PressFeedbackOutOfRange {
                value: self.press_feedback_ms,
                max: crate::MAX_PATTERN_SEGMENT_MS,
            });
        }
        if self.max_history == 0 {
            return Err(ConfigError::HistoryLimitZero);
        }
        Ok(())
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(TICK_INTERVAL_MS)
    }

    /// The alerting signal always loops until the session's lease is released.
    #[must_use]
    pub fn alert_signal(&self) -> AlertSignal {
        AlertSignal::looping(self.alert_pattern.clone())
    }

    pub fn press_feedback(&self) -> Result<AlertSignal, ConfigError> {
        Ok(AlertSignal::once(VibrationPattern::pulse(
            self.press_feedback_ms,
        )?))
    }
}
