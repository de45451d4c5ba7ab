use serde::{Deserialize, Serialize};

use crate::contacts::EmergencyContact;
use crate::dispatch::{AlertRecord, AlertStatus};
use crate::model::{ToastKind, ToastMessage};
use crate::profile::ProfileSettings;
use crate::trigger::{TriggerKind, TriggerSession};
use crate::{format_time_ago, AppError, ErrorSeverity};

/// Countdown overlay. The shell shows it whenever this is `Some` and sends
/// `CountdownDismissed` if it has to take it down for any other reason.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountdownView {
    pub title: String,
    pub subtitle: String,
    pub kind: TriggerKind,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub message: String,
    pub cancel_label: String,
    pub send_now_label: String,
}

impl From<&TriggerSession> for CountdownView {
    fn from(session: &TriggerSession) -> Self {
        let remaining = session.remaining_seconds();
        Self {
            title: "Emergency Alert".into(),
            subtitle: session.kind().detection_label().into(),
            kind: session.kind(),
            remaining_seconds: remaining,
            total_seconds: session.total_seconds(),
            message: format!("Sending emergency alert in {remaining} seconds"),
            cancel_label: "Cancel".into(),
            send_now_label: "Send Now".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertListItem {
    pub id: String,
    pub title: String,
    pub kind: TriggerKind,
    pub status: AlertStatus,
    pub time_ago: String,
    pub created_at_ms: u64,
}

impl AlertListItem {
    #[must_use]
    pub fn build(record: &AlertRecord, now_ms: u64) -> Self {
        Self {
            id: record.id.0.clone(),
            title: record.kind.alert_title().into(),
            kind: record.kind,
            status: record.status,
            time_ago: format_time_ago(record.created_at.as_millis(), now_ms),
            created_at_ms: record.created_at.as_millis(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertDetail {
    pub id: String,
    pub title: String,
    pub kind: TriggerKind,
    pub status: AlertStatus,
    pub status_label: String,
    pub created_at_ms: u64,
    pub time_ago: String,
    pub countdown_seconds: Option<u32>,
    pub is_delivered: bool,
}

impl AlertDetail {
    #[must_use]
    pub fn build(record: &AlertRecord, now_ms: u64) -> Self {
        Self {
            id: record.id.0.clone(),
            title: record.kind.alert_title().into(),
            kind: record.kind,
            status: record.status,
            status_label: record.status.display_name().into(),
            created_at_ms: record.created_at.as_millis(),
            time_ago: format_time_ago(record.created_at.as_millis(), now_ms),
            countdown_seconds: record.countdown_seconds,
            is_delivered: record.status == AlertStatus::Sent,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactView {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub relationship: String,
    pub notification_label: String,
}

impl From<&EmergencyContact> for ContactView {
    fn from(c: &EmergencyContact) -> Self {
        Self {
            id: c.id.0.clone(),
            name: c.name.clone(),
            phone: c.phone.clone(),
            relationship: c.relationship.clone(),
            notification_label: c.notification_preference.label().into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

/// Profile settings screen. List fields are joined for the text inputs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProfileView {
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub blood_type: String,
    pub allergies: String,
    pub medications: String,
    pub conditions: String,
    pub notes: String,
    pub share_location: bool,
    pub share_medical_info: bool,
    pub is_editing: bool,
    pub action_label: String,
}

impl From<&ProfileSettings> for ProfileView {
    fn from(settings: &ProfileSettings) -> Self {
        let profile = settings.current();
        let medical = &profile.medical_info;
        Self {
            full_name: profile.full_name(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            phone: profile.phone.clone(),
            email: profile.email.clone().unwrap_or_default(),
            blood_type: medical.blood_type.clone().unwrap_or_default(),
            allergies: medical.allergies.join(", "),
            medications: medical.medications.join(", "),
            conditions: medical.conditions.join(", "),
            notes: medical.notes.clone().unwrap_or_default(),
            share_location: settings.sharing.share_location,
            share_medical_info: settings.sharing.share_medical_info,
            is_editing: settings.is_editing(),
            action_label: if settings.is_editing() { "Save" } else { "Edit" }.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ViewModel {
    pub countdown: Option<CountdownView>,
    pub recent_alerts: Vec<AlertListItem>,
    pub selected_alert: Option<AlertDetail>,
    pub contacts: Vec<ContactView>,
    pub profile: ProfileView,
    pub error: Option<UserFacingError>,
    pub toast: Option<ToastView>,
}
