//! Alert records and the boundary to whatever delivers them.
//!
//! The core never delivers anything itself. A confirmed countdown becomes a
//! [`DispatchRequest`] handed to an [`AlertDispatcher`]; the dispatcher
//! answers with a [`DeliveryHandle`] and reports status changes later.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

use crate::trigger::TriggerKind;
use crate::{UnixTimeMs, DEFAULT_MAX_HISTORY};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub String);

impl AlertId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(format!("alert-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Countdown,
    Confirmed,
    Cancelled,
    Sent,
    #[default]
    Pending,
    Failed,
}

impl AlertStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Countdown => "countdown",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Sent => "sent",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Countdown => "Counting down",
            Self::Confirmed => "Confirmed",
            Self::Cancelled => "Cancelled",
            Self::Sent => "Sent",
            Self::Pending => "Sending",
            Self::Failed => "Failed",
        }
    }

    /// Delivery has settled one way or the other.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Sent | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub trigger_kind: TriggerKind,
    pub timestamp: UnixTimeMs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryHandle {
    pub alert_id: AlertId,
    pub status: AlertStatus,
}

/// Sends a confirmed alert on its way.
pub trait AlertDispatcher {
    fn dispatch(&self, request: DispatchRequest) -> DeliveryHandle;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: AlertId,
    pub kind: TriggerKind,
    pub status: AlertStatus,
    pub created_at: UnixTimeMs,
    pub countdown_seconds: Option<u32>,
}

impl AlertRecord {
    #[must_use]
    pub fn from_handle(
        handle: DeliveryHandle,
        request: DispatchRequest,
        countdown_seconds: u32,
    ) -> Self {
        Self {
            id: handle.alert_id,
            kind: request.trigger_kind,
            status: handle.status,
            created_at: request.timestamp,
            countdown_seconds: Some(countdown_seconds),
        }
    }
}

/// Newest-first list of alerts, bounded to `limit` entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertHistory {
    records: VecDeque<AlertRecord>,
    limit: usize,
}

impl Default for AlertHistory {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_HISTORY)
    }
}

impl AlertHistory {
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Two delivered alerts from earlier in the week, shown until the real
    /// history store exists.
    #[must_use]
    pub fn seeded(now: UnixTimeMs, limit: usize) -> Self {
        let mut history = Self::with_limit(limit);
        history.push(AlertRecord {
            id: AlertId::new("alert-002"),
            kind: TriggerKind::BiometricAnomaly,
            status: AlertStatus::Sent,
            created_at: now.sub_millis(3 * DAY_MS),
            countdown_seconds: None,
        });
        history.push(AlertRecord {
            id: AlertId::new("alert-001"),
            kind: TriggerKind::TapPattern,
            status: AlertStatus::Sent,
            created_at: now.sub_millis(DAY_MS),
            countdown_seconds: None,
        });
        history
    }

    pub fn push(&mut self, record: AlertRecord) {
        self.records.push_front(record);
        self.records.truncate(self.limit);
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        self.records.truncate(self.limit);
    }

    #[must_use]
    pub fn get(&self, id: &AlertId) -> Option<&AlertRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Returns the previous status when the alert exists.
    pub fn update_status(&mut self, id: &AlertId, status: AlertStatus) -> Option<AlertStatus> {
        let record = self.records.iter_mut().find(|r| &r.id == id)?;
        Some(std::mem::replace(&mut record.status, status))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, at: u64) -> AlertRecord {
        AlertRecord {
            id: AlertId::new(id),
            kind: TriggerKind::TapPattern,
            status: AlertStatus::Pending,
            created_at: UnixTimeMs(at),
            countdown_seconds: Some(5),
        }
    }

    #[test]
    fn test_alert_id_generate() {
        let a = AlertId::generate();
        let b = AlertId::generate();
        assert!(a.as_str().starts_with("alert-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_history_is_newest_first_and_bounded() {
        let mut history = AlertHistory::with_limit(2);
        history.push(record("a", 1));
        history.push(record("b", 2));
        history.push(record("c", 3));

        let ids: Vec<_> = history.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert!(history.get(&AlertId::new("a")).is_none());
    }

    #[test]
    fn test_history_update_status() {
        let mut history = AlertHistory::default();
        history.push(record("a", 1));

        assert_eq!(
            history.update_status(&AlertId::new("a"), AlertStatus::Sent),
            Some(AlertStatus::Pending)
        );
        assert_eq!(history.get(&AlertId::new("a")).unwrap().status, AlertStatus::Sent);
        assert_eq!(history.update_status(&AlertId::new("zz"), AlertStatus::Sent), None);
    }

    #[test]
    fn test_seeded_history() {
        let now = UnixTimeMs(10 * DAY_MS);
        let history = AlertHistory::seeded(now, DEFAULT_MAX_HISTORY);

        assert_eq!(history.len(), 2);
        let first = history.iter().next().unwrap();
        assert_eq!(first.id.as_str(), "alert-001");
        assert_eq!(first.created_at, UnixTimeMs(9 * DAY_MS));
        assert!(history.iter().all(|r| r.status == AlertStatus::Sent));
    }

    #[test]
    fn test_set_limit_truncates() {
        let mut history = AlertHistory::seeded(UnixTimeMs(10 * DAY_MS), 10);
        history.set_limit(1);
        assert_eq!(history.len(), 1);
        history.set_limit(0);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_record_from_handle() {
        let request = DispatchRequest {
            trigger_kind: TriggerKind::BiometricAnomaly,
            timestamp: UnixTimeMs(42),
        };
        let handle = DeliveryHandle {
            alert_id: AlertId::new("alert-x"),
            status: AlertStatus::Pending,
        };
        let record = AlertRecord::from_handle(handle, request, 5);
        assert_eq!(record.kind, TriggerKind::BiometricAnomaly);
        assert_eq!(record.created_at, UnixTimeMs(42));
        assert_eq!(record.countdown_seconds, Some(5));
    }

    #[test]
    fn test_status_settled() {
        assert!(AlertStatus::Sent.is_settled());
        assert!(AlertStatus::Failed.is_settled());
        assert!(!AlertStatus::Pending.is_settled());
        assert_eq!(AlertStatus::Pending.to_string(), "Sending");
    }
}
