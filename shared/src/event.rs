use serde::{Deserialize, Serialize};

use crate::config::TriggerConfig;
use crate::contacts::{ContactId, EmergencyContact};
use crate::dispatch::{AlertId, AlertStatus};
use crate::profile::UserProfile;
use crate::trigger::{SessionId, TriggerKind};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum Event {
    #[default]
    Noop,

    AppStarted,

    // SOS button on the home screen
    EmergencyPressed,
    // ring detectors
    TriggerDetected {
        kind: TriggerKind,
    },

    CountdownTick {
        session: SessionId,
    },
    CancelPressed,
    SendNowPressed,
    CountdownDismissed,

    DispatchUpdated {
        alert_id: AlertId,
        status: AlertStatus,
        detail: Option<String>,
    },

    AlertSelected {
        alert_id: AlertId,
    },
    AlertDeselected,

    ContactAdded(EmergencyContact),
    ContactEdited(EmergencyContact),
    ContactRemoved {
        contact_id: ContactId,
    },

    // profile settings screen
    ProfileEditStarted,
    ProfileEdited(UserProfile),
    ProfileSaved,
    ProfileEditCancelled,
    ToggleShareLocation,
    ToggleShareMedicalInfo,

    TestRingConnection,
    ConfigureTrigger(TriggerConfig),

    DismissError,
    DismissToast,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::AppStarted => "app_started",
            Self::EmergencyPressed => "emergency_pressed",
            Self::TriggerDetected { .. } => "trigger_detected",
            Self::CountdownTick { .. } => "countdown_tick",
            Self::CancelPressed => "cancel_pressed",
            Self::SendNowPressed => "send_now_pressed",
            Self::CountdownDismissed => "countdown_dismissed",
            Self::DispatchUpdated { .. } => "dispatch_updated",
            Self::AlertSelected { .. } => "alert_selected",
            Self::AlertDeselected => "alert_deselected",
            Self::ContactAdded(_) => "contact_added",
            Self::ContactEdited(_) => "contact_edited",
            Self::ContactRemoved { .. } => "contact_removed",
            Self::ProfileEditStarted => "profile_edit_started",
            Self::ProfileEdited(_) => "profile_edited",
            Self::ProfileSaved => "profile_saved",
            Self::ProfileEditCancelled => "profile_edit_cancelled",
            Self::ToggleShareLocation => "toggle_share_location",
            Self::ToggleShareMedicalInfo => "toggle_share_medical_info",
            Self::TestRingConnection => "test_ring_connection",
            Self::ConfigureTrigger(_) => "configure_trigger",
            Self::DismissError => "dismiss_error",
            Self::DismissToast => "dismiss_toast",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::EmergencyPressed
                | Self::CancelPressed
                | Self::SendNowPressed
                | Self::CountdownDismissed
                | Self::AlertSelected { .. }
                | Self::AlertDeselected
                | Self::ContactAdded(_)
                | Self::ContactEdited(_)
                | Self::ContactRemoved { .. }
                | Self::ProfileEditStarted
                | Self::ProfileSaved
                | Self::ProfileEditCancelled
                | Self::ToggleShareLocation
                | Self::ToggleShareMedicalInfo
                | Self::TestRingConnection
                | Self::DismissError
                | Self::DismissToast
        )
    }
}
