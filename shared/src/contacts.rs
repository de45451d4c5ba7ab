use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{AppError, ErrorKind};

pub const MAX_CONTACTS: usize = 10;
pub const MAX_NAME_LENGTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

impl ContactId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPreference {
    #[default]
    Sms,
    Email,
    Both,
}

impl NotificationPreference {
    #[must_use]
    pub const fn needs_email(self) -> bool {
        matches!(self, Self::Email | Self::Both)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sms => "SMS",
            Self::Email => "Email",
            Self::Both => "SMS & Email",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub id: ContactId,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub relationship: String,
    #[serde(default)]
    pub notification_preference: NotificationPreference,
}

impl EmergencyContact {
    pub fn validate(&self) -> Result<(), ContactError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ContactError::MissingField("id"));
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ContactError::MissingField("name"));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(ContactError::NameTooLong {
                max: MAX_NAME_LENGTH,
            });
        }
        if self.phone.trim().is_empty() {
            return Err(ContactError::MissingField("phone"));
        }
        if !self
            .phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'))
        {
            return Err(ContactError::InvalidPhone(self.phone.clone()));
        }
        let has_email = self
            .email
            .as_deref()
            .is_some_and(|e| e.contains('@') && !e.trim().is_empty());
        if self.notification_preference.needs_email() && !has_email {
            return Err(ContactError::EmailRequired);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactError {
    #[error("Contact {0} is required")]
    MissingField(&'static str),
    #[error("Contact name is longer than {max} characters")]
    NameTooLong { max: usize },
    #[error("Phone number {0:?} contains invalid characters")]
    InvalidPhone(String),
    #[error("An email address is required for email notifications")]
    EmailRequired,
    #[error("Contact {0} already exists")]
    Duplicate(ContactId),
    #[error("Contact {0} not found")]
    NotFound(ContactId),
    #[error("At most {max} emergency contacts can be saved")]
    Full { max: usize },
}

impl From<ContactError> for AppError {
    fn from(e: ContactError) -> Self {
        let kind = match &e {
            ContactError::MissingField(_)
            | ContactError::NameTooLong { .. }
            | ContactError::InvalidPhone(_)
            | ContactError::EmailRequired
            | ContactError::Full { .. } => ErrorKind::Validation,
            ContactError::Duplicate(_) => ErrorKind::Conflict,
            ContactError::NotFound(_) => ErrorKind::NotFound,
        };
        AppError::new(kind, e.to_string())
    }
}

/// In-memory list of the people notified when an alert goes out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactBook {
    contacts: Vec<EmergencyContact>,
}

impl ContactBook {
    #[must_use]
    pub fn seeded() -> Self {
        let contact = |id: &str, name: &str, phone: &str, relationship: &str| EmergencyContact {
            id: ContactId::new(id),
            name: name.into(),
            phone: phone.into(),
            email: None,
            relationship: relationship.into(),
            notification_preference: NotificationPreference::Sms,
        };
        Self {
            contacts: vec![
                contact("1", "Mom", "+91 98765 43210", "Family"),
                contact("2", "Dad", "+91 98765 12345", "Family"),
                contact("3", "Roommate", "+91 87654 32109", "Friend"),
            ],
        }
    }

    pub fn add(&mut self, contact: EmergencyContact) -> Result<(), ContactError> {
        contact.validate()?;
        if self.get(&contact.id).is_some() {
            return Err(ContactError::Duplicate(contact.id));
        }
        if self.contacts.len() >= MAX_CONTACTS {
            return Err(ContactError::Full { max: MAX_CONTACTS });
        }
        self.contacts.push(contact);
        Ok(())
    }

    pub fn remove(&mut self, id: &ContactId) -> Result<EmergencyContact, ContactError> {
        let index = self
            .contacts
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| ContactError::NotFound(id.clone()))?;
        Ok(self.contacts.remove(index))
    }

    /// Replaces the contact with the same id and returns the previous entry.
    pub fn update(&mut self, contact: EmergencyContact) -> Result<EmergencyContact, ContactError> {
        contact.validate()?;
        let existing = self
            .contacts
            .iter_mut()
            .find(|c| c.id == contact.id)
            .ok_or_else(|| ContactError::NotFound(contact.id.clone()))?;
        Ok(std::mem::replace(existing, contact))
    }

    #[must_use]
    pub fn get(&self, id: &ContactId) -> Option<&EmergencyContact> {
        self.contacts.iter().find(|c| &c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmergencyContact> {
        self.contacts.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
