//! Emergency countdown state machine.
//!
//! A session moves `Idle -> Counting -> {Cancelled, Confirmed}`. Starting a
//! session hands a [`SignalLease`] to the trigger; the lease stands for the
//! alerting signal and the tick driver together, and every exit path
//! (cancel, confirm now, countdown elapsed, teardown) gives it back so the
//! host stops both at once.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{AppError, ErrorKind, UnixTimeMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    TapPattern,
    BiometricAnomaly,
}

impl TriggerKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TapPattern => "tap_pattern",
            Self::BiometricAnomaly => "biometric_anomaly",
        }
    }

    /// Subtitle shown on the countdown overlay.
    #[must_use]
    pub const fn detection_label(self) -> &'static str {
        match self {
            Self::TapPattern => "Triple Tap Detected",
            Self::BiometricAnomaly => "Abnormal Biometrics Detected",
        }
    }

    /// Title used for the alert in history lists.
    #[must_use]
    pub const fn alert_title(self) -> &'static str {
        match self {
            Self::TapPattern => "Triple Tap Alert",
            Self::BiometricAnomaly => "Biometric Alert",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Counting,
    Cancelled,
    Confirmed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Counting => "counting",
            Self::Cancelled => "cancelled",
            Self::Confirmed => "confirmed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Confirmed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Cancelled,
    Confirmed,
}

impl From<Outcome> for SessionState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Cancelled => Self::Cancelled,
            Outcome::Confirmed => Self::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionCause {
    CountdownElapsed,
    UserCancelled,
    SendNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOperation {
    Start,
    Tick,
    Cancel,
    ConfirmNow,
}

impl fmt::Display for TriggerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Tick => "tick",
            Self::Cancel => "cancel",
            Self::ConfirmNow => "confirm",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("cannot {operation} an emergency countdown that is {from}")]
    InvalidStateTransition {
        from: SessionState,
        operation: TriggerOperation,
    },
    #[error("countdown must be a positive number of seconds, got {0}")]
    InvalidConfiguration(i64),
}

impl From<TriggerError> for AppError {
    fn from(e: TriggerError) -> Self {
        let kind = match &e {
            TriggerError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            TriggerError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
        };
        let error = AppError::new(kind, e.to_string());
        match e {
            TriggerError::InvalidStateTransition { from, operation } => error
                .with_context("state", from.as_str())
                .with_context("operation", operation.to_string()),
            TriggerError::InvalidConfiguration(seconds) => {
                error.with_context("seconds", seconds.to_string())
            }
        }
    }
}

/// Stops the two resources a live countdown holds.
pub trait SignalRelease {
    fn stop_alerting(&self, session: SessionId);
    fn stop_ticking(&self, session: SessionId);
}

/// Proof that a session's alerting signal and tick driver are running.
#[must_use = "the alerting signal and tick driver keep running until the lease is released"]
#[derive(Debug, PartialEq, Eq)]
pub struct SignalLease {
    session: SessionId,
}

impl SignalLease {
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    pub fn release<R: SignalRelease + ?Sized>(self, host: &R) {
        debug!(session = %self.session, "releasing alerting signal and tick driver");
        host.stop_ticking(self.session);
        host.stop_alerting(self.session);
        std::mem::forget(self);
    }
}

impl Drop for SignalLease {
    fn drop(&mut self) {
        warn!(
            session = %self.session,
            "signal lease dropped without release, alerting signal and tick driver may still be running"
        );
        #[cfg(test)]
        tests::UNRELEASED_LEASES.with(|count| count.set(count.get() + 1));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSession {
    id: SessionId,
    kind: TriggerKind,
    total_seconds: u32,
    remaining_seconds: u32,
    state: SessionState,
    started_at: UnixTimeMs,
}

impl TriggerSession {
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> TriggerKind {
        self.kind
    }

    #[must_use]
    pub const fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    #[must_use]
    pub const fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn started_at(&self) -> UnixTimeMs {
        self.started_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub session: SessionId,
    pub kind: TriggerKind,
    pub outcome: Outcome,
    pub cause: ResolutionCause,
    pub total_seconds: u32,
    pub remaining_seconds: u32,
    pub resolved_at: UnixTimeMs,
}

/// A session that just reached a terminal state, together with the lease
/// the caller now has to release.
#[must_use = "a finished session still owns a running signal until its lease is released"]
#[derive(Debug)]
pub struct Finished {
    pub resolution: Resolution,
    pub lease: SignalLease,
}

#[must_use]
#[derive(Debug)]
pub enum Tick {
    Counting {
        session: SessionId,
        remaining_seconds: u32,
    },
    Finished(Finished),
}

#[derive(Debug)]
struct LiveSession {
    session: TriggerSession,
    lease: SignalLease,
}

/// Owner of the single emergency countdown. A new session can only be
/// started once the previous one has finished or been torn down.
#[derive(Debug, Default)]
pub struct EmergencyTrigger {
    live: Option<LiveSession>,
    last: Option<Resolution>,
    next_id: u64,
}

impl EmergencyTrigger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the current session, or of the last finished one.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match (&self.live, &self.last) {
            (Some(live), _) => live.session.state,
            (None, Some(resolution)) => resolution.outcome.into(),
            (None, None) => SessionState::Idle,
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<&TriggerSession> {
        self.live.as_ref().map(|live| &live.session)
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    #[must_use]
    pub fn last_resolution(&self) -> Option<&Resolution> {
        self.last.as_ref()
    }

    /// Begins a countdown of `total_seconds`. The configuration is checked
    /// before anything starts, and a second session is refused while one is
    /// still live.
    pub fn start(
        &mut self,
        kind: TriggerKind,
        total_seconds: i64,
    ) -> Result<&TriggerSession, TriggerError> {
        let total = u32::try_from(total_seconds)
            .ok()
            .filter(|s| *s > 0)
            .ok_or(TriggerError::InvalidConfiguration(total_seconds))?;

        if self.is_live() {
            return Err(TriggerError::InvalidStateTransition {
                from: SessionState::Counting,
                operation: TriggerOperation::Start,
            });
        }

        self.next_id += 1;
        let id = SessionId(self.next_id);
        info!(session = %id, kind = %kind, seconds = total, "emergency countdown started");

        self.last = None;
        let live = self.live.insert(LiveSession {
            session: TriggerSession {
                id,
                kind,
                total_seconds: total,
                remaining_seconds: total,
                state: SessionState::Counting,
                started_at: UnixTimeMs::now(),
            },
            lease: SignalLease { session: id },
        });
        Ok(&live.session)
    }

    /// One elapsed second. Reaching zero confirms the session.
    pub fn tick(&mut self) -> Result<Tick, TriggerError> {
        let from = self.state();
        let Some(LiveSession { session, .. }) = self.live.as_mut() else {
            return Err(TriggerError::InvalidStateTransition {
                from,
                operation: TriggerOperation::Tick,
            });
        };

        session.remaining_seconds = session.remaining_seconds.saturating_sub(1);
        if session.remaining_seconds > 0 {
            debug!(session = %session.id, remaining = session.remaining_seconds, "countdown tick");
            return Ok(Tick::Counting {
                session: session.id,
                remaining_seconds: session.remaining_seconds,
            });
        }

        self.finish(
            Outcome::Confirmed,
            ResolutionCause::CountdownElapsed,
            TriggerOperation::Tick,
        )
        .map(Tick::Finished)
    }

    pub fn cancel(&mut self) -> Result<Finished, TriggerError> {
        self.finish(
            Outcome::Cancelled,
            ResolutionCause::UserCancelled,
            TriggerOperation::Cancel,
        )
    }

    /// Confirms immediately, leaving the remaining count where it was.
    pub fn confirm_now(&mut self) -> Result<Finished, TriggerError> {
        self.finish(
            Outcome::Confirmed,
            ResolutionCause::SendNow,
            TriggerOperation::ConfirmNow,
        )
    }

    /// Drops a live session without an outcome, e.g. when the overlay is
    /// dismissed. Returns the lease so the caller can stop its resources.
    pub fn teardown(&mut self) -> Option<SignalLease> {
        let LiveSession { session, lease } = self.live.take()?;
        info!(session = %session.id, remaining = session.remaining_seconds, "emergency countdown torn down");
        Some(lease)
    }

    fn finish(
        &mut self,
        outcome: Outcome,
        cause: ResolutionCause,
        operation: TriggerOperation,
    ) -> Result<Finished, TriggerError> {
        let Some(LiveSession { session, lease }) = self.live.take() else {
            return Err(TriggerError::InvalidStateTransition {
                from: self.state(),
                operation,
            });
        };

        let resolution = Resolution {
            session: session.id,
            kind: session.kind,
            outcome,
            cause,
            total_seconds: session.total_seconds,
            remaining_seconds: session.remaining_seconds,
            resolved_at: UnixTimeMs::now(),
        };
        info!(
            session = %session.id,
            outcome = ?outcome,
            cause = ?cause,
            remaining = session.remaining_seconds,
            "emergency countdown finished"
        );
        self.last = Some(resolution.clone());
        Ok(Finished { resolution, lease })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};

    thread_local! {
        pub(super) static UNRELEASED_LEASES: Cell<usize> = const { Cell::new(0) };
    }

    fn unreleased_leases() -> usize {
        UNRELEASED_LEASES.with(Cell::get)
    }

    #[derive(Default)]
    struct RecordingHost {
        stopped: RefCell<Vec<(&'static str, SessionId)>>,
    }

    impl SignalRelease for RecordingHost {
        fn stop_alerting(&self, session: SessionId) {
            self.stopped.borrow_mut().push(("signal", session));
        }

        fn stop_ticking(&self, session: SessionId) {
            self.stopped.borrow_mut().push(("ticks", session));
        }
    }

    fn run_to_end(trigger: &mut EmergencyTrigger) -> (usize, Finished) {
        let mut ticks = 0;
        loop {
            ticks += 1;
            match trigger.tick().expect("live session accepts ticks") {
                Tick::Counting { .. } => {}
                Tick::Finished(finished) => return (ticks, finished),
            }
        }
    }

    #[test]
    fn test_start_tap_pattern_five_ticks_confirms() {
        let mut trigger = EmergencyTrigger::new();
        trigger.start(TriggerKind::TapPattern, 5).unwrap();

        let (ticks, finished) = run_to_end(&mut trigger);

        assert_eq!(ticks, 5);
        assert_eq!(finished.resolution.outcome, Outcome::Confirmed);
        assert_eq!(finished.resolution.cause, ResolutionCause::CountdownElapsed);
        assert_eq!(finished.resolution.remaining_seconds, 0);
        assert_eq!(trigger.state(), SessionState::Confirmed);
        assert!(!trigger.is_live());

        let host = RecordingHost::default();
        finished.lease.release(&host);
        assert_eq!(host.stopped.borrow().len(), 2);
    }

    #[test]
    fn test_cancel_after_two_ticks_then_tick_has_no_effect() {
        let mut trigger = EmergencyTrigger::new();
        trigger.start(TriggerKind::BiometricAnomaly, 5).unwrap();
        assert!(matches!(trigger.tick(), Ok(Tick::Counting { remaining_seconds: 4, .. })));
        assert!(matches!(trigger.tick(), Ok(Tick::Counting { remaining_seconds: 3, .. })));

        let finished = trigger.cancel().unwrap();
        assert_eq!(finished.resolution.outcome, Outcome::Cancelled);
        assert_eq!(finished.resolution.remaining_seconds, 3);

        let err = trigger.tick().unwrap_err();
        assert_eq!(
            err,
            TriggerError::InvalidStateTransition {
                from: SessionState::Cancelled,
                operation: TriggerOperation::Tick,
            }
        );
        assert_eq!(trigger.state(), SessionState::Cancelled);
        assert_eq!(trigger.last_resolution(), Some(&finished.resolution));
    }

    #[test]
    fn test_confirm_now_bypasses_countdown() {
        let mut trigger = EmergencyTrigger::new();
        trigger.start(TriggerKind::TapPattern, 10).unwrap();

        let finished = trigger.confirm_now().unwrap();

        assert_eq!(finished.resolution.outcome, Outcome::Confirmed);
        assert_eq!(finished.resolution.cause, ResolutionCause::SendNow);
        assert_eq!(finished.resolution.remaining_seconds, 10);
        assert_eq!(finished.lease.session(), finished.resolution.session);
    }

    #[test]
    fn test_second_terminal_call_is_rejected() {
        let mut trigger = EmergencyTrigger::new();
        trigger.start(TriggerKind::TapPattern, 3).unwrap();
        let _ = trigger.confirm_now().unwrap();

        assert!(matches!(
            trigger.cancel(),
            Err(TriggerError::InvalidStateTransition {
                from: SessionState::Confirmed,
                operation: TriggerOperation::Cancel,
            })
        ));
        assert!(matches!(
            trigger.confirm_now(),
            Err(TriggerError::InvalidStateTransition {
                from: SessionState::Confirmed,
                operation: TriggerOperation::ConfirmNow,
            })
        ));
        assert_eq!(trigger.state(), SessionState::Confirmed);
    }

    #[test]
    fn test_operations_before_start_are_rejected() {
        let mut trigger = EmergencyTrigger::new();

        assert!(matches!(
            trigger.cancel(),
            Err(TriggerError::InvalidStateTransition { from: SessionState::Idle, .. })
        ));
        assert!(matches!(
            trigger.tick(),
            Err(TriggerError::InvalidStateTransition { from: SessionState::Idle, .. })
        ));
        assert!(trigger.teardown().is_none());
    }

    #[test]
    fn test_non_positive_duration_is_invalid_configuration() {
        let mut trigger = EmergencyTrigger::new();

        assert_eq!(
            trigger.start(TriggerKind::TapPattern, 0).unwrap_err(),
            TriggerError::InvalidConfiguration(0)
        );
        assert_eq!(
            trigger.start(TriggerKind::TapPattern, -3).unwrap_err(),
            TriggerError::InvalidConfiguration(-3)
        );
        assert_eq!(
            trigger
                .start(TriggerKind::TapPattern, i64::from(u32::MAX) + 1)
                .unwrap_err(),
            TriggerError::InvalidConfiguration(i64::from(u32::MAX) + 1)
        );
        assert_eq!(trigger.state(), SessionState::Idle);
        assert!(trigger.session().is_none());
    }

    #[test]
    fn test_start_while_live_is_rejected() {
        let mut trigger = EmergencyTrigger::new();
        let first = trigger.start(TriggerKind::TapPattern, 5).unwrap().id();

        let err = trigger.start(TriggerKind::BiometricAnomaly, 5).unwrap_err();
        assert_eq!(
            err,
            TriggerError::InvalidStateTransition {
                from: SessionState::Counting,
                operation: TriggerOperation::Start,
            }
        );
        assert_eq!(trigger.session().map(TriggerSession::id), Some(first));
        assert_eq!(trigger.session().map(TriggerSession::kind), Some(TriggerKind::TapPattern));
    }

    #[test]
    fn test_new_session_after_finish_gets_fresh_id() {
        let mut trigger = EmergencyTrigger::new();
        let first = trigger.start(TriggerKind::TapPattern, 5).unwrap().id();
        let _ = trigger.cancel().unwrap();

        let second = trigger.start(TriggerKind::TapPattern, 5).unwrap();
        assert_ne!(second.id(), first);
        assert_eq!(second.remaining_seconds(), 5);
        assert_eq!(second.state(), SessionState::Counting);
    }

    #[test]
    fn test_teardown_returns_lease_without_outcome() {
        let mut trigger = EmergencyTrigger::new();
        let id = trigger.start(TriggerKind::BiometricAnomaly, 5).unwrap().id();

        let lease = trigger.teardown().expect("live session has a lease");
        assert_eq!(lease.session(), id);
        assert_eq!(trigger.state(), SessionState::Idle);
        assert!(trigger.last_resolution().is_none());

        let host = RecordingHost::default();
        lease.release(&host);
        assert_eq!(
            *host.stopped.borrow(),
            vec![("ticks", id), ("signal", id)]
        );
    }

    #[test]
    fn test_start_returns_the_session_it_made_live() {
        let mut trigger = EmergencyTrigger::new();
        let _ = trigger.confirm_now();
        trigger.start(TriggerKind::TapPattern, 3).unwrap();
        let _ = trigger.cancel().unwrap();

        let started = trigger.start(TriggerKind::BiometricAnomaly, 7).unwrap().clone();
        assert_eq!(trigger.session(), Some(&started));
        assert_eq!(started.kind(), TriggerKind::BiometricAnomaly);
        assert_eq!(started.remaining_seconds(), 7);
        assert_eq!(trigger.state(), SessionState::Counting);
        assert!(trigger.last_resolution().is_none());
    }

    #[test]
    fn test_released_leases_are_not_reported() {
        let before = unreleased_leases();
        let host = RecordingHost::default();
        let mut trigger = EmergencyTrigger::new();

        trigger.start(TriggerKind::TapPattern, 5).unwrap();
        trigger.cancel().unwrap().lease.release(&host);
        trigger.start(TriggerKind::TapPattern, 5).unwrap();
        trigger.teardown().unwrap().release(&host);

        assert_eq!(host.stopped.borrow().len(), 4);
        assert_eq!(unreleased_leases(), before);
    }

    #[test]
    fn test_dropping_an_unreleased_lease_is_reported() {
        let before = unreleased_leases();
        let mut trigger = EmergencyTrigger::new();

        trigger.start(TriggerKind::TapPattern, 5).unwrap();
        let finished = trigger.confirm_now().unwrap();
        drop(finished);
        assert_eq!(unreleased_leases(), before + 1);

        trigger.start(TriggerKind::TapPattern, 5).unwrap();
        drop(trigger);
        assert_eq!(unreleased_leases(), before + 2);
    }

    #[test]
    fn test_trigger_error_into_app_error() {
        let err: AppError = TriggerError::InvalidStateTransition {
            from: SessionState::Confirmed,
            operation: TriggerOperation::Cancel,
        }
        .into();
        assert_eq!(err.kind, ErrorKind::InvalidStateTransition);
        assert_eq!(err.context.get("state"), Some(&"confirmed".to_string()));

        let err: AppError = TriggerError::InvalidConfiguration(-1).into();
        assert_eq!(err.code(), "INVALID_CONFIGURATION");
    }

    proptest! {
        #[test]
        fn prop_uninterrupted_countdown_confirms_once(n in 1i64..200) {
            let mut trigger = EmergencyTrigger::new();
            trigger.start(TriggerKind::TapPattern, n).unwrap();

            let (ticks, finished) = run_to_end(&mut trigger);

            prop_assert_eq!(i64::try_from(ticks).unwrap(), n);
            prop_assert_eq!(finished.resolution.outcome, Outcome::Confirmed);
            prop_assert_eq!(finished.resolution.remaining_seconds, 0);
            prop_assert!(trigger.tick().is_err());
            prop_assert!(trigger.confirm_now().is_err());
            prop_assert!(trigger.cancel().is_err());
        }

        #[test]
        fn prop_cancel_after_k_ticks((n, k) in (1i64..100).prop_flat_map(|n| (Just(n), 0..n))) {
            let mut trigger = EmergencyTrigger::new();
            trigger.start(TriggerKind::BiometricAnomaly, n).unwrap();

            for _ in 0..k {
                let tick = trigger.tick().unwrap();
                let counting = matches!(tick, Tick::Counting { .. });
                prop_assert!(counting);
            }

            let finished = trigger.cancel().unwrap();
            prop_assert_eq!(finished.resolution.outcome, Outcome::Cancelled);
            prop_assert_eq!(i64::from(finished.resolution.remaining_seconds), n - k);

            prop_assert!(trigger.tick().is_err());
            prop_assert_eq!(trigger.state(), SessionState::Cancelled);
            prop_assert!(trigger.cancel().is_err());
        }

        #[test]
        fn prop_confirm_now_keeps_remaining((n, k) in (1i64..100).prop_flat_map(|n| (Just(n), 0..n))) {
            let mut trigger = EmergencyTrigger::new();
            trigger.start(TriggerKind::TapPattern, n).unwrap();
            for _ in 0..k {
                let _ = trigger.tick().unwrap();
            }

            let finished = trigger.confirm_now().unwrap();
            prop_assert_eq!(finished.resolution.outcome, Outcome::Confirmed);
            prop_assert_eq!(i64::from(finished.resolution.remaining_seconds), n - k);
        }
    }
}
