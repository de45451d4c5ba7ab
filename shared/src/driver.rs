//! Countdown driver for hosts that run the core on a tokio runtime instead
//! of behind a Crux shell (watch companions, integration harnesses).
//!
//! Every transition goes through one mutex around the [`EmergencyTrigger`],
//! so of a cancel, a send-now and the final tick only the first one wins.
//! The alerting signal lives in a [`SignalGuard`] and the tick loop in a
//! spawned task; both are stopped through the session's lease on whichever
//! exit path runs first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, TriggerConfig};
use crate::dispatch::{AlertDispatcher, DispatchRequest};
use crate::signal::AlertSignal;
use crate::trigger::{
    EmergencyTrigger, Finished, Outcome, Resolution, SessionId, SessionState, SignalRelease,
    Tick, TriggerError, TriggerKind,
};
use crate::{AppError, ErrorKind, UnixTimeMs};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("countdown {0} is no longer live")]
    SessionEnded(SessionId),

    #[error("countdown {0} was torn down before it resolved")]
    TornDown(SessionId),

    #[error("no tokio runtime to drive the countdown")]
    NoRuntime,
}

impl From<DriverError> for AppError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Trigger(e) => e.into(),
            DriverError::Config(e) => e.into(),
            DriverError::SessionEnded(session) | DriverError::TornDown(session) => {
                AppError::new(ErrorKind::InvalidStateTransition, "This countdown has already ended")
                    .with_internal(e.to_string())
                    .with_context("session", session.to_string())
            }
            DriverError::NoRuntime => AppError::new(ErrorKind::Internal, "Countdown could not start")
                .with_internal(e.to_string()),
        }
    }
}

/// Whatever plays the alerting signal on this host.
pub trait AlertSignalHost: Send + Sync {
    fn start_signal(&self, session: SessionId, signal: &AlertSignal);
    fn stop_signal(&self, session: SessionId);
}

/// Keeps the alerting signal running. Stopping is idempotent and also
/// happens on drop.
pub struct SignalGuard {
    host: Arc<dyn AlertSignalHost>,
    session: SessionId,
    stopped: AtomicBool,
}

impl SignalGuard {
    fn start(host: Arc<dyn AlertSignalHost>, session: SessionId, signal: &AlertSignal) -> Self {
        host.start_signal(session, signal);
        Self {
            host,
            session,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!(session = %self.session, "alerting signal stopped");
            self.host.stop_signal(self.session);
        }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resources held for the live session.
struct Live {
    guard: SignalGuard,
    ticker: AbortHandle,
    outcome: oneshot::Sender<Resolution>,
}

impl SignalRelease for Live {
    fn stop_alerting(&self, _session: SessionId) {
        self.guard.stop();
    }

    fn stop_ticking(&self, _session: SessionId) {
        self.ticker.abort();
    }
}

#[derive(Default)]
struct DriverState {
    trigger: EmergencyTrigger,
    live: Option<Live>,
}

impl DriverState {
    fn live_session(&self) -> Option<SessionId> {
        self.trigger.session().map(|s| s.id())
    }

    fn ensure_live(&self, session: SessionId) -> Result<(), DriverError> {
        match self.live_session() {
            Some(live) if live != session => Err(DriverError::SessionEnded(session)),
            _ => Ok(()),
        }
    }
}

struct Shared {
    state: Mutex<DriverState>,
    dispatcher: Arc<dyn AlertDispatcher + Send + Sync>,
}

impl Shared {
    // Transitions leave the trigger consistent before anything can panic,
    // so a poisoned lock still holds valid state.
    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve<F>(&self, session: SessionId, op: F) -> Result<Resolution, DriverError>
    where
        F: FnOnce(&mut EmergencyTrigger) -> Result<Finished, TriggerError>,
    {
        let (finished, live) = {
            let mut state = self.lock();
            state.ensure_live(session)?;
            let finished = op(&mut state.trigger)?;
            (finished, state.live.take())
        };
        Ok(self.settle(finished, live))
    }

    /// Returns `true` while the countdown keeps running.
    fn tick(&self, session: SessionId) -> bool {
        let (finished, live) = {
            let mut state = self.lock();
            if state.live_session() != Some(session) {
                debug!(session = %session, "tick for a session that is no longer live");
                return false;
            }
            match state.trigger.tick() {
                Ok(Tick::Counting { .. }) => return true,
                Ok(Tick::Finished(finished)) => (finished, state.live.take()),
                Err(e) => {
                    warn!(error = %e, "tick rejected");
                    return false;
                }
            }
        };
        self.settle(finished, live);
        false
    }

    fn settle(&self, finished: Finished, live: Option<Live>) -> Resolution {
        let Finished { resolution, lease } = finished;
        let Some(live) = live else {
            warn!(session = %resolution.session, "resolved a session with no live resources");
            drop(lease);
            return resolution;
        };

        lease.release(&live);

        if resolution.outcome == Outcome::Confirmed {
            let handle = self.dispatcher.dispatch(DispatchRequest {
                trigger_kind: resolution.kind,
                timestamp: UnixTimeMs::now(),
            });
            info!(session = %resolution.session, alert_id = %handle.alert_id, "emergency alert handed to dispatcher");
        }

        if live.outcome.send(resolution.clone()).is_err() {
            debug!(session = %resolution.session, "outcome receiver already gone");
        }
        resolution
    }
}

async fn run_ticker(shared: Arc<Shared>, session: SessionId, period: Duration) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if !shared.tick(session) {
            break;
        }
    }
}

/// Runs emergency countdowns on the current tokio runtime.
pub struct CountdownDriver {
    shared: Arc<Shared>,
    signal_host: Arc<dyn AlertSignalHost>,
    config: TriggerConfig,
}

impl CountdownDriver {
    pub fn new(
        config: TriggerConfig,
        signal_host: Arc<dyn AlertSignalHost>,
        dispatcher: Arc<dyn AlertDispatcher + Send + Sync>,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DriverState::default()),
                dispatcher,
            }),
            signal_host,
            config,
        })
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.lock().trigger.state()
    }

    #[must_use]
    pub fn last_resolution(&self) -> Option<Resolution> {
        self.shared.lock().trigger.last_resolution().cloned()
    }

    /// Starts a countdown of the configured length.
    pub fn spawn(&self, kind: TriggerKind) -> Result<CountdownHandle, DriverError> {
        self.spawn_with(kind, i64::from(self.config.countdown_seconds))
    }

    #[instrument(skip(self))]
    pub fn spawn_with(
        &self,
        kind: TriggerKind,
        total_seconds: i64,
    ) -> Result<CountdownHandle, DriverError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| DriverError::NoRuntime)?;

        let mut state = self.shared.lock();
        let session = state.trigger.start(kind, total_seconds)?.id();

        let guard = SignalGuard::start(
            Arc::clone(&self.signal_host),
            session,
            &self.config.alert_signal(),
        );
        let ticker = runtime.spawn(run_ticker(
            Arc::clone(&self.shared),
            session,
            self.config.tick_interval(),
        ));
        let (tx, rx) = oneshot::channel();
        state.live = Some(Live {
            guard,
            ticker: ticker.abort_handle(),
            outcome: tx,
        });

        info!(session = %session, "countdown driver running");
        Ok(CountdownHandle {
            session,
            shared: Arc::clone(&self.shared),
            outcome: Some(rx),
        })
    }
}

/// Controls one countdown. Dropping it before the countdown resolves tears
/// the session down without an outcome.
pub struct CountdownHandle {
    session: SessionId,
    shared: Arc<Shared>,
    outcome: Option<oneshot::Receiver<Resolution>>,
}

impl CountdownHandle {
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// `None` once this countdown is no longer live.
    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.shared
            .lock()
            .trigger
            .session()
            .filter(|s| s.id() == self.session)
            .map(|s| s.remaining_seconds())
    }

    pub fn cancel(&self) -> Result<Resolution, DriverError> {
        self.shared.resolve(self.session, EmergencyTrigger::cancel)
    }

    pub fn confirm_now(&self) -> Result<Resolution, DriverError> {
        self.shared.resolve(self.session, EmergencyTrigger::confirm_now)
    }

    /// Waits for whichever exit path resolves the countdown first.
    pub async fn outcome(mut self) -> Result<Resolution, DriverError> {
        let session = self.session;
        let rx = self.outcome.take().ok_or(DriverError::TornDown(session))?;
        rx.await.map_err(|_| DriverError::TornDown(session))
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        let (lease, live) = {
            let mut state = self.shared.lock();
            if state.live_session() != Some(self.session) {
                return;
            }
            let Some(lease) = state.trigger.teardown() else {
                return;
            };
            (lease, state.live.take())
        };

        match live {
            Some(live) => lease.release(&live),
            None => drop(lease),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AlertId, AlertStatus, DeliveryHandle};
    use crate::trigger::{ResolutionCause, TriggerOperation};

    #[derive(Default)]
    struct RecordingSignal {
        started: Mutex<Vec<SessionId>>,
        stopped: Mutex<Vec<SessionId>>,
    }

    impl RecordingSignal {
        fn stops(&self) -> usize {
            self.stopped.lock().unwrap().len()
        }
    }

    impl AlertSignalHost for RecordingSignal {
        fn start_signal(&self, session: SessionId, signal: &AlertSignal) {
            assert!(signal.repeat);
            self.started.lock().unwrap().push(session);
        }

        fn stop_signal(&self, session: SessionId) {
            self.stopped.lock().unwrap().push(session);
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        requests: Mutex<Vec<DispatchRequest>>,
    }

    impl AlertDispatcher for RecordingDispatcher {
        fn dispatch(&self, request: DispatchRequest) -> DeliveryHandle {
            self.requests.lock().unwrap().push(request);
            DeliveryHandle {
                alert_id: AlertId::generate(),
                status: AlertStatus::Pending,
            }
        }
    }

    fn driver() -> (CountdownDriver, Arc<RecordingSignal>, Arc<RecordingDispatcher>) {
        let signal = Arc::new(RecordingSignal::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let driver = CountdownDriver::new(
            TriggerConfig::default(),
            signal.clone(),
            dispatcher.clone(),
        )
        .unwrap();
        (driver, signal, dispatcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_runs_to_confirmation() {
        let (driver, signal, dispatcher) = driver();

        let handle = driver.spawn(TriggerKind::TapPattern).unwrap();
        assert_eq!(handle.remaining_seconds(), Some(5));

        let resolution = handle.outcome().await.unwrap();
        assert_eq!(resolution.outcome, Outcome::Confirmed);
        assert_eq!(resolution.cause, ResolutionCause::CountdownElapsed);
        assert_eq!(resolution.remaining_seconds, 0);

        assert_eq!(signal.stops(), 1);
        let requests = dispatcher.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].trigger_kind, TriggerKind::TapPattern);
        assert_eq!(driver.state(), SessionState::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_two_ticks() {
        let (driver, signal, dispatcher) = driver();

        let handle = driver.spawn(TriggerKind::BiometricAnomaly).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(handle.remaining_seconds(), Some(3));

        let resolution = handle.cancel().unwrap();
        assert_eq!(resolution.outcome, Outcome::Cancelled);
        assert_eq!(resolution.remaining_seconds, 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(driver.state(), SessionState::Cancelled);
        assert_eq!(signal.stops(), 1);
        assert!(dispatcher.requests.lock().unwrap().is_empty());

        let outcome = handle.outcome().await.unwrap();
        assert_eq!(outcome.outcome, Outcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_now_keeps_remaining() {
        let (driver, signal, dispatcher) = driver();

        let handle = driver.spawn_with(TriggerKind::TapPattern, 10).unwrap();
        let resolution = handle.confirm_now().unwrap();
        assert_eq!(resolution.outcome, Outcome::Confirmed);
        assert_eq!(resolution.cause, ResolutionCause::SendNow);
        assert_eq!(resolution.remaining_seconds, 10);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(signal.stops(), 1);
        assert_eq!(dispatcher.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_resolution_is_rejected() {
        let (driver, _signal, dispatcher) = driver();

        let handle = driver.spawn(TriggerKind::TapPattern).unwrap();
        handle.cancel().unwrap();

        let err = handle.confirm_now().unwrap_err();
        assert!(matches!(
            err,
            DriverError::Trigger(TriggerError::InvalidStateTransition {
                from: SessionState::Cancelled,
                operation: TriggerOperation::ConfirmNow,
            })
        ));
        assert!(dispatcher.requests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_duration_starts_nothing() {
        let (driver, signal, _dispatcher) = driver();

        for seconds in [0, -3] {
            let err = driver.spawn_with(TriggerKind::TapPattern, seconds).err();
            assert!(matches!(
                err,
                Some(DriverError::Trigger(TriggerError::InvalidConfiguration(s))) if s == seconds
            ));
        }
        assert!(signal.started.lock().unwrap().is_empty());
        assert_eq!(driver.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_spawn_while_live_is_rejected() {
        let (driver, signal, _dispatcher) = driver();

        let _handle = driver.spawn(TriggerKind::TapPattern).unwrap();
        let err = driver.spawn(TriggerKind::BiometricAnomaly).err();
        assert!(matches!(
            err,
            Some(DriverError::Trigger(TriggerError::InvalidStateTransition { .. }))
        ));
        assert_eq!(signal.started.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_tears_down() {
        let (driver, signal, dispatcher) = driver();

        let handle = driver.spawn(TriggerKind::TapPattern).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(handle);

        assert_eq!(signal.stops(), 1);
        assert_eq!(driver.state(), SessionState::Idle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(dispatcher.requests.lock().unwrap().is_empty());
        assert!(driver.last_resolution().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_handle_cannot_touch_new_session() {
        let (driver, _signal, _dispatcher) = driver();

        let first = driver.spawn(TriggerKind::TapPattern).unwrap();
        first.cancel().unwrap();

        let second = driver.spawn(TriggerKind::BiometricAnomaly).unwrap();
        assert!(matches!(first.cancel(), Err(DriverError::SessionEnded(_))));
        assert!(second.remaining_seconds().is_some());
        assert!(first.remaining_seconds().is_none());
    }

    #[test]
    fn test_spawn_outside_runtime() {
        let (driver, _signal, _dispatcher) = driver();
        assert!(matches!(
            driver.spawn(TriggerKind::TapPattern),
            Err(DriverError::NoRuntime)
        ));
    }

    #[test]
    fn test_driver_error_to_app_error() {
        let err: AppError = DriverError::SessionEnded(SessionId(4)).into();
        assert_eq!(err.kind, ErrorKind::InvalidStateTransition);
        assert_eq!(err.context.get("session").map(String::as_str), Some("session-4"));
    }
}
