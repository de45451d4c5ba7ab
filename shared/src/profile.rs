use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AppError, ErrorKind};

pub const BLOOD_TYPES: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
pub const MAX_MEDICAL_NOTES: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicalInfo {
    pub blood_type: Option<String>,
    pub allergies: Vec<String>,
    pub medications: Vec<String>,
    pub conditions: Vec<String>,
    pub notes: Option<String>,
}

impl MedicalInfo {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blood_type.is_none()
            && self.allergies.is_empty()
            && self.medications.is_empty()
            && self.conditions.is_empty()
            && self.notes.is_none()
    }
}

/// Splits a comma separated field as typed into the settings form.
#[must_use]
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub medical_info: MedicalInfo,
}

impl UserProfile {
    #[must_use]
    pub fn seeded() -> Self {
        Self {
            first_name: "Raj".into(),
            last_name: "Patel".into(),
            phone: "+91 98765 43210".into(),
            email: Some("raj.patel@example.com".into()),
            medical_info: MedicalInfo {
                blood_type: Some("O+".into()),
                allergies: vec!["Peanuts".into(), "Penicillin".into()],
                medications: vec!["Blood pressure medication".into()],
                conditions: vec!["Asthma".into()],
                notes: Some("Carry inhaler at all times".into()),
            },
        }
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.first_name.trim().is_empty() {
            return Err(ProfileError::MissingField("first name"));
        }
        if self.phone.trim().is_empty() {
            return Err(ProfileError::MissingField("phone"));
        }
        if !self
            .phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'))
        {
            return Err(ProfileError::InvalidPhone(self.phone.clone()));
        }
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            if !email.contains('@') {
                return Err(ProfileError::InvalidEmail(email.to_string()));
            }
        }
        if let Some(blood_type) = &self.medical_info.blood_type {
            if !BLOOD_TYPES.contains(&blood_type.trim()) {
                return Err(ProfileError::UnknownBloodType(blood_type.clone()));
            }
        }
        let notes = self.medical_info.notes.as_deref().unwrap_or_default();
        if notes.chars().count() > MAX_MEDICAL_NOTES {
            return Err(ProfileError::NotesTooLong {
                max: MAX_MEDICAL_NOTES,
            });
        }
        Ok(())
    }
}

/// What the alert may carry besides the trigger itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingPreferences {
    pub share_location: bool,
    pub share_medical_info: bool,
}

impl Default for SharingPreferences {
    fn default() -> Self {
        Self {
            share_location: true,
            share_medical_info: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("Profile {0} is required")]
    MissingField(&'static str),
    #[error("Phone number {0:?} contains invalid characters")]
    InvalidPhone(String),
    #[error("{0:?} is not a valid email address")]
    InvalidEmail(String),
    #[error("Unknown blood type {0:?}")]
    UnknownBloodType(String),
    #[error("Medical notes are longer than {max} characters")]
    NotesTooLong { max: usize },
    #[error("Profile is not being edited")]
    NotEditing,
}

impl From<ProfileError> for AppError {
    fn from(e: ProfileError) -> Self {
        let kind = match &e {
            ProfileError::NotEditing => ErrorKind::InvalidStateTransition,
            _ => ErrorKind::Validation,
        };
        AppError::new(kind, e.to_string())
    }
}

/// The saved profile plus the draft the settings screen is working on.
/// Edits only land in the draft and are checked when saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    saved: UserProfile,
    draft: Option<UserProfile>,
    pub sharing: SharingPreferences,
}

impl ProfileSettings {
    #[must_use]
    pub fn seeded() -> Self {
        Self {
            saved: UserProfile::seeded(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn saved(&self) -> &UserProfile {
        &self.saved
    }

    /// What the screen shows: the draft while editing, else the saved profile.
    #[must_use]
    pub fn current(&self) -> &UserProfile {
        self.draft.as_ref().unwrap_or(&self.saved)
    }

    #[must_use]
    pub const fn is_editing(&self) -> bool {
        self.draft.is_some()
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.saved == UserProfile::default()
    }

    pub fn begin_edit(&mut self) {
        if self.draft.is_none() {
            self.draft = Some(self.saved.clone());
        }
    }

    pub fn edit(&mut self, profile: UserProfile) -> Result<(), ProfileError> {
        let draft = self.draft.as_mut().ok_or(ProfileError::NotEditing)?;
        *draft = profile;
        Ok(())
    }

    /// Keeps the draft open when it fails validation so it can be fixed.
    pub fn save(&mut self) -> Result<&UserProfile, ProfileError> {
        let draft = self.draft.as_ref().ok_or(ProfileError::NotEditing)?;
        draft.validate()?;
        if let Some(draft) = self.draft.take() {
            self.saved = draft;
        }
        Ok(&self.saved)
    }

    pub fn discard(&mut self) -> bool {
        self.draft.take().is_some()
    }

    pub fn toggle_share_location(&mut self) -> bool {
        self.sharing.share_location = !self.sharing.share_location;
        self.sharing.share_location
    }

    pub fn toggle_share_medical_info(&mut self) -> bool {
        self.sharing.share_medical_info = !self.sharing.share_medical_info;
        self.sharing.share_medical_info
    }
}
