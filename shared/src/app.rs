use tracing::{debug, info, warn};

use crate::capabilities::{Capabilities, TickerOutput};
use crate::dispatch::{AlertDispatcher, AlertHistory, AlertRecord, AlertStatus, DispatchRequest};
use crate::contacts::ContactBook;
use crate::profile::ProfileSettings;
use crate::event::Event;
use crate::model::{Model, ToastKind};
use crate::trigger::{Finished, Outcome, SessionId, Tick, TriggerKind};
use crate::view::{
    AlertDetail, AlertListItem, ContactView, CountdownView, ProfileView, ToastView,
    UserFacingError, ViewModel,
};
use crate::{AppError, ErrorKind, UnixTimeMs};

#[derive(Default)]
pub struct App;

impl App {
    fn start_countdown(kind: TriggerKind, model: &mut Model, caps: &Capabilities) {
        let seconds = i64::from(model.config.countdown_seconds);
        match model.trigger.start(kind, seconds) {
            Ok(session) => {
                let id = session.id();
                caps.haptics.start_alerting(id, model.config.alert_signal());
                Self::arm_tick(id, model, caps);
            }
            Err(e) => {
                warn!(error = %e, kind = %kind, "emergency trigger rejected");
                model.set_error(e.into());
            }
        }
    }

    fn arm_tick(session: SessionId, model: &Model, caps: &Capabilities) {
        caps.ticker
            .arm(session, model.config.tick_interval(), |output| match output {
                TickerOutput::Elapsed { session } => Event::CountdownTick { session },
                TickerOutput::Disarmed { .. } => Event::Noop,
            });
    }

    /// Releases the lease first, so the signal and ticker are stopped no
    /// matter what happens with the outcome.
    fn finish(finished: Finished, model: &mut Model, caps: &Capabilities) {
        let Finished { resolution, lease } = finished;
        lease.release(caps);

        match resolution.outcome {
            Outcome::Confirmed => {
                let request = DispatchRequest {
                    trigger_kind: resolution.kind,
                    timestamp: UnixTimeMs::now(),
                };
                let handle = caps.dispatch.dispatch(request);
                let record = AlertRecord::from_handle(handle, request, resolution.total_seconds);
                model.selected_alert = Some(record.id.clone());
                model.history.push(record);
                model.show_toast("Emergency alert sent", ToastKind::Warning);
            }
            Outcome::Cancelled => {
                model.show_toast("Emergency alert cancelled", ToastKind::Info);
            }
        }
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        model.update_timestamp();

        let event_name = event.name();
        if event.is_user_initiated() {
            info!(event = event_name, "user action");
        } else {
            debug!(event = event_name, "event");
        }

        match event {
            Event::Noop => {}

            Event::AppStarted => {
                let now = UnixTimeMs(model.view_timestamp_ms);
                if model.history.is_empty() {
                    model.history = AlertHistory::seeded(now, model.config.max_history);
                }
                if model.contacts.is_empty() {
                    model.contacts = ContactBook::seeded();
                }
                if model.profile.is_blank() {
                    model.profile = ProfileSettings::seeded();
                }
                caps.render.render();
            }

            Event::EmergencyPressed => {
                match model.config.press_feedback() {
                    Ok(signal) => caps.haptics.feedback(signal),
                    Err(e) => warn!(error = %e, "press feedback skipped"),
                }
                Self::start_countdown(TriggerKind::TapPattern, model, caps);
                caps.render.render();
            }

            Event::TriggerDetected { kind } => {
                Self::start_countdown(kind, model, caps);
                caps.render.render();
            }

            Event::CountdownTick { session } => {
                let live = model.trigger.session().map(|s| s.id());
                if live != Some(session) {
                    debug!(session = %session, "ignoring tick for a session that is no longer live");
                    return;
                }

                match model.trigger.tick() {
                    Ok(Tick::Counting { session, .. }) => Self::arm_tick(session, model, caps),
                    Ok(Tick::Finished(finished)) => Self::finish(finished, model, caps),
                    Err(e) => {
                        warn!(error = %e, "tick rejected");
                        return;
                    }
                }
                caps.render.render();
            }

            Event::CancelPressed => {
                match model.trigger.cancel() {
                    Ok(finished) => Self::finish(finished, model, caps),
                    Err(e) => {
                        warn!(error = %e, "cancel rejected");
                        model.set_error(e.into());
                    }
                }
                caps.render.render();
            }

            Event::SendNowPressed => {
                match model.trigger.confirm_now() {
                    Ok(finished) => Self::finish(finished, model, caps),
                    Err(e) => {
                        warn!(error = %e, "send now rejected");
                        model.set_error(e.into());
                    }
                }
                caps.render.render();
            }

            Event::CountdownDismissed => {
                if let Some(lease) = model.trigger.teardown() {
                    lease.release(caps);
                }
                caps.render.render();
            }

            Event::DispatchUpdated {
                alert_id,
                status,
                detail,
            } => {
                match model.history.update_status(&alert_id, status) {
                    Some(previous) => {
                        info!(alert_id = %alert_id, from = previous.as_str(), to = status.as_str(), "alert delivery updated");
                    }
                    None => {
                        warn!(alert_id = %alert_id, "delivery update for unknown alert");
                        return;
                    }
                }

                if status == AlertStatus::Failed {
                    let mut error = AppError::new(ErrorKind::Dispatch, "Alert delivery failed")
                        .with_context("alert_id", alert_id.as_str());
                    if let Some(detail) = detail {
                        error = error.with_internal(detail);
                    }
                    model.set_error(error);
                }
                caps.render.render();
            }

            Event::AlertSelected { alert_id } => {
                if model.history.get(&alert_id).is_some() {
                    model.selected_alert = Some(alert_id);
                } else {
                    model.set_error(
                        AppError::new(ErrorKind::NotFound, "Alert not found")
                            .with_context("alert_id", alert_id.as_str()),
                    );
                }
                caps.render.render();
            }

            Event::AlertDeselected => {
                model.selected_alert = None;
                caps.render.render();
            }

            Event::ContactAdded(contact) => {
                let name = contact.name.clone();
                match model.contacts.add(contact) {
                    Ok(()) => model.show_toast(format!("{name} added"), ToastKind::Success),
                    Err(e) => model.set_error(e.into()),
                }
                caps.render.render();
            }

            Event::ContactEdited(contact) => {
                match model.contacts.update(contact) {
                    Ok(previous) => {
                        model.show_toast(format!("{} updated", previous.name), ToastKind::Success);
                    }
                    Err(e) => model.set_error(e.into()),
                }
                caps.render.render();
            }

            Event::ContactRemoved { contact_id } => {
                match model.contacts.remove(&contact_id) {
                    Ok(removed) => {
                        model.show_toast(format!("{} removed", removed.name), ToastKind::Info);
                    }
                    Err(e) => model.set_error(e.into()),
                }
                caps.render.render();
            }

            Event::ProfileEditStarted => {
                model.profile.begin_edit();
                caps.render.render();
            }

            Event::ProfileEdited(profile) => {
                if let Err(e) = model.profile.edit(profile) {
                    warn!(error = %e, "profile edit rejected");
                    model.set_error(e.into());
                }
                caps.render.render();
            }

            Event::ProfileSaved => {
                match model.profile.save() {
                    Ok(_) => {
                        info!("profile saved");
                        model.show_toast("Profile saved successfully!", ToastKind::Success);
                    }
                    Err(e) => {
                        warn!(error = %e, "profile save rejected");
                        model.set_error(e.into());
                    }
                }
                caps.render.render();
            }

            Event::ProfileEditCancelled => {
                model.profile.discard();
                caps.render.render();
            }

            Event::ToggleShareLocation => {
                let enabled = model.profile.toggle_share_location();
                debug!(enabled, "location sharing toggled");
                caps.render.render();
            }

            Event::ToggleShareMedicalInfo => {
                let enabled = model.profile.toggle_share_medical_info();
                debug!(enabled, "medical info sharing toggled");
                caps.render.render();
            }

            Event::TestRingConnection => {
                caps.haptics
                    .feedback(crate::signal::AlertSignal::once(crate::signal::VibrationPattern::ring_test()));
                model.show_toast("Ring connection is good!", ToastKind::Success);
                caps.render.render();
            }

            Event::ConfigureTrigger(config) => {
                if model.trigger.is_live() {
                    model.set_error(AppError::new(
                        ErrorKind::InvalidStateTransition,
                        "Trigger settings cannot change while a countdown is running",
                    ));
                } else {
                    match config.validate() {
                        Ok(()) => {
                            info!(seconds = config.countdown_seconds, "trigger configuration updated");
                            model.history.set_limit(config.max_history);
                            model.config = config;
                        }
                        Err(e) => {
                            warn!(error = %e, "trigger configuration rejected");
                            model.set_error(e.into());
                        }
                    }
                }
                caps.render.render();
            }

            Event::DismissError => {
                model.clear_error();
                caps.render.render();
            }

            Event::DismissToast => {
                model.clear_toast();
                caps.render.render();
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        let now_ms = model.view_timestamp_ms;

        ViewModel {
            countdown: model.trigger.session().map(CountdownView::from),
            recent_alerts: model
                .history
                .iter()
                .map(|r| AlertListItem::build(r, now_ms))
                .collect(),
            selected_alert: model
                .selected_alert
                .as_ref()
                .and_then(|id| model.history.get(id))
                .map(|r| AlertDetail::build(r, now_ms)),
            contacts: model.contacts.iter().map(ContactView::from).collect(),
            profile: ProfileView::from(&model.profile),
            error: model.active_error.as_ref().map(UserFacingError::from),
            toast: model
                .active_toast
                .as_ref()
                .filter(|t| !t.is_expired(now_ms))
                .map(ToastView::from),
        }
    }
}
