//! Restore outcomes and audit log records.

use crate::DeviceId;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Result of a restore: the identity the device lives under now, and whether that is the
/// identity the snapshot asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub id: DeviceId,
    pub preserved: bool,
}

/// Kind of audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Restore,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Restore => "restore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "restore" => Some(AuditAction::Restore),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller hands to [`crate::AuditStore::append`]; the store assigns sequence and
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditAppend {
    pub action: AuditAction,
    pub requested_id: Option<DeviceId>,
    pub restored_id: DeviceId,
    pub preserved: bool,
}

impl AuditAppend {
    pub fn restore(requested_id: Option<DeviceId>, outcome: RestoreOutcome) -> Self {
        Self {
            action: AuditAction::Restore,
            requested_id,
            restored_id: outcome.id,
            preserved: outcome.preserved,
        }
    }
}

/// One stored audit entry. `id` is the insertion sequence and breaks timestamp ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: u64,
    pub action: AuditAction,
    #[serde(default)]
    pub requested_id: Option<DeviceId>,
    pub restored_id: DeviceId,
    #[serde(rename = "preservedId")]
    pub preserved: bool,
    pub timestamp: DateTime<Utc>,
}

/// Filter and window for listing audit entries. No limit unless one is given.
#[derive(Debug, Clone, Default)]
pub struct AuditListOptions {
    /// Entries with `timestamp >= since`.
    pub since: Option<DateTime<Utc>>,
    /// Entries with `timestamp < until`.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditListOptions {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp >= until {
                return false;
            }
        }
        true
    }
}

/// Wall-clock time at the precision audit stores keep (microseconds), so an entry reads back
/// identical from every backend.
pub fn audit_clock() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Timestamp for the next append: never earlier than the previous entry's.
pub fn next_audit_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = audit_clock();
    match last {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn timestamps_never_run_backwards() {
        let future = audit_clock() + Duration::seconds(30);
        assert_eq!(next_audit_timestamp(Some(future)), future);
        let past = audit_clock() - Duration::seconds(30);
        assert!(next_audit_timestamp(Some(past)) > past);
    }

    #[test]
    fn entry_serializes_with_ui_field_names() {
        let entry = AuditEntry {
            id: 1,
            action: AuditAction::Restore,
            requested_id: None,
            restored_id: DeviceId(9),
            preserved: false,
            timestamp: audit_clock(),
        };
        let j = serde_json::to_value(&entry).unwrap();
        assert_eq!(j["action"], "restore");
        assert_eq!(j["requestedId"], serde_json::Value::Null);
        assert_eq!(j["restoredId"], 9);
        assert_eq!(j["preservedId"], false);
    }

    #[test]
    fn list_options_window_is_half_open() {
        let t = audit_clock();
        let entry = AuditEntry {
            id: 1,
            action: AuditAction::Restore,
            requested_id: Some(DeviceId(1)),
            restored_id: DeviceId(1),
            preserved: true,
            timestamp: t,
        };
        let at = AuditListOptions {
            since: Some(t),
            until: Some(t),
            ..Default::default()
        };
        assert!(!at.matches(&entry));
        let around = AuditListOptions {
            since: Some(t),
            until: Some(t + Duration::microseconds(1)),
            ..Default::default()
        };
        assert!(around.matches(&entry));
    }
}
