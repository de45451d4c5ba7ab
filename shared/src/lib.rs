// lib.rs - Hal0 shared core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod contacts;
pub mod dispatch;
pub mod driver;
pub mod event;
pub mod model;
pub mod profile;
pub mod signal;
pub mod trigger;
pub mod view;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::{ConfigError, TriggerConfig};
pub use contacts::{ContactBook, ContactError, ContactId, EmergencyContact, NotificationPreference};
pub use crux_core::{render::Render, App as CruxApp};
pub use dispatch::{
    AlertDispatcher, AlertHistory, AlertId, AlertRecord, AlertStatus, DeliveryHandle,
    DispatchRequest,
};
pub use event::Event;
pub use model::{Model, ToastKind, ToastMessage};
pub use profile::{MedicalInfo, ProfileError, ProfileSettings, SharingPreferences, UserProfile};
pub use signal::{AlertSignal, PatternError, VibrationPattern};
pub use trigger::{
    EmergencyTrigger, Finished, Outcome, Resolution, ResolutionCause, SessionId, SessionState,
    SignalLease, SignalRelease, Tick, TriggerError, TriggerKind, TriggerOperation, TriggerSession,
};
pub use view::ViewModel;

pub const DEFAULT_COUNTDOWN_SECONDS: u32 = 5;
pub const MAX_COUNTDOWN_SECONDS: u32 = 300;
/// Countdown resolution. One tick is one elapsed second.
pub const TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_PRESS_FEEDBACK_MS: u64 = 200;
pub const DEFAULT_MAX_HISTORY: usize = 50;
pub const MAX_PATTERN_SEGMENTS: usize = 32;
pub const MAX_PATTERN_SEGMENT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidStateTransition,
    InvalidConfiguration,
    Validation,
    NotFound,
    Conflict,
    Dispatch,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Dispatch => "DISPATCH_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Dispatch => ErrorSeverity::Transient,

            Self::InvalidStateTransition
            | Self::InvalidConfiguration
            | Self::Validation
            | Self::NotFound
            | Self::Conflict => ErrorSeverity::Permanent,

            Self::Internal => ErrorSeverity::Fatal,
        }
    }

    /// Every fault raised by the core is local and synchronous. Only a
    /// delivery failure reported back by the shell is worth another attempt,
    /// and that attempt belongs to the shell.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Dispatch)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::InvalidStateTransition => {
                "That action is no longer available for this alert.".into()
            }
            ErrorKind::InvalidConfiguration | ErrorKind::Validation => self.message.clone(),
            ErrorKind::NotFound => "The requested item could not be found.".into(),
            ErrorKind::Conflict => "That item already exists.".into(),
            ErrorKind::Dispatch => {
                "The emergency alert could not be delivered. Please call emergency services directly."
                    .into()
            }
            ErrorKind::Internal => "An unexpected error occurred.".into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(get_current_time_ms())
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn elapsed_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    #[must_use]
    pub fn sub_millis(self, ms: u64) -> Self {
        Self(self.0.saturating_sub(ms))
    }
}

impl Default for UnixTimeMs {
    fn default() -> Self {
        Self::now()
    }
}

#[must_use]
pub fn format_time_ago(timestamp_ms: u64, now_ms: u64) -> String {
    if timestamp_ms > now_ms {
        return "Just now".into();
    }

    let diff_secs = now_ms.saturating_sub(timestamp_ms) / 1000;

    if diff_secs < 5 {
        return "Just now".into();
    }
    if diff_secs < 60 {
        return format!("{diff_secs}s ago");
    }

    let diff_mins = diff_secs / 60;
    if diff_mins < 60 {
        return format!("{diff_mins}m ago");
    }

    let diff_hours = diff_mins / 60;
    if diff_hours < 24 {
        return format!("{diff_hours}h ago");
    }

    let diff_days = diff_hours / 24;
    if diff_days < 7 {
        return format!("{diff_days}d ago");
    }
    if diff_days < 30 {
        return format!("{}w ago", diff_days / 7);
    }
    if diff_days < 365 {
        return format!("{}mo ago", diff_days / 30);
    }

    format!("{}y ago", diff_days / 365)
}
