//! Device records, request bodies, and response envelopes for the device API.

use crate::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Device type assigned when a request leaves it out or sends an empty string.
pub const DEFAULT_DEVICE_TYPE: &str = "unknown";

/// Primary key of a device row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

impl DeviceId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for DeviceId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device row as held by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub ip: Option<String>,
    pub device_type: String,
    pub building_id: Option<i64>,
    pub floorplan_id: Option<i64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub note: Option<String>,
    pub mac: Option<String>,
    pub room: Option<String>,
    pub created: DateTime<Utc>,
}

/// Validated column values for inserting a device. The store assigns `created`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub name: String,
    pub ip: Option<String>,
    pub device_type: String,
    pub building_id: Option<i64>,
    pub floorplan_id: Option<i64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub note: Option<String>,
    pub mac: Option<String>,
    pub room: Option<String>,
}

impl NewDevice {
    pub fn into_device(self, id: DeviceId, created: DateTime<Utc>) -> Device {
        Device {
            id,
            name: self.name,
            ip: self.ip,
            device_type: self.device_type,
            building_id: self.building_id,
            floorplan_id: self.floorplan_id,
            x: self.x,
            y: self.y,
            note: self.note,
            mac: self.mac,
            room: self.room,
            created,
        }
    }
}

/// Create-device request (also one row of a bulk import). Unknown keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub building_id: Option<i64>,
    #[serde(default)]
    pub floorplan_id: Option<i64>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
}

/// Partial update. The outer `Option` says whether the key was sent at all; the inner one
/// carries an explicit `null`. Keys outside this list are dropped during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicePatch {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub ip: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub building_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub floorplan_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub x: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub y: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub note: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub mac: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub room: Option<Option<String>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl DevicePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write the present keys onto `device`. `name` and `device_type` are only replaced by a
    /// concrete value; rejecting `null` for them is the caller's job.
    pub fn apply_to(&self, device: &mut Device) {
        if let Some(Some(ref name)) = self.name {
            device.name = name.clone();
        }
        if let Some(Some(ref device_type)) = self.device_type {
            device.device_type = device_type.clone();
        }
        if let Some(ref ip) = self.ip {
            device.ip = ip.clone();
        }
        if let Some(building_id) = self.building_id {
            device.building_id = building_id;
        }
        if let Some(floorplan_id) = self.floorplan_id {
            device.floorplan_id = floorplan_id;
        }
        if let Some(x) = self.x {
            device.x = x;
        }
        if let Some(y) = self.y {
            device.y = y;
        }
        if let Some(ref note) = self.note {
            device.note = note.clone();
        }
        if let Some(ref mac) = self.mac {
            device.mac = mac.clone();
        }
        if let Some(ref room) = self.room {
            device.room = room.clone();
        }
    }
}

/// `POST /api/devices` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeviceResponse {
    pub id: DeviceId,
}

/// `PUT /api/devices/:id` response; `prev` is the state right before the update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDeviceResponse {
    pub status: String,
    pub prev: Snapshot,
}

/// `DELETE /api/devices/:id` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteDeviceResponse {
    pub status: String,
    pub snapshot: Snapshot,
}

/// `POST /api/devices/restore` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResponse {
    pub restored: bool,
    pub id: DeviceId,
    pub preserved_id: bool,
}

/// `POST /api/devices/import` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResponse {
    pub created: usize,
}

/// `POST /api/admin/audit/cleanup` body. `before` is an RFC 3339 timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditCleanupRequest {
    pub before: String,
}

/// `POST /api/admin/audit/cleanup` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditCleanupResponse {
    pub removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Device {
        Device {
            id: DeviceId(7),
            name: "Sw1".to_string(),
            ip: Some("10.0.0.5".to_string()),
            device_type: "switch".to_string(),
            building_id: Some(1),
            floorplan_id: None,
            x: Some(0.5),
            y: Some(0.25),
            note: Some("rack 2".to_string()),
            mac: None,
            room: Some("Lab-A".to_string()),
            created: Utc::now(),
        }
    }

    #[test]
    fn patch_distinguishes_missing_from_null() {
        let patch: DevicePatch =
            serde_json::from_value(json!({ "note": null, "x": 0.75, "bogus": 1 })).unwrap();
        assert_eq!(patch.note, Some(None));
        assert_eq!(patch.x, Some(Some(0.75)));
        assert_eq!(patch.ip, None);

        let mut device = sample();
        patch.apply_to(&mut device);
        assert_eq!(device.note, None);
        assert_eq!(device.x, Some(0.75));
        assert_eq!(device.ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(device.room.as_deref(), Some("Lab-A"));
    }

    #[test]
    fn empty_patch_leaves_device_untouched() {
        let patch: DevicePatch = serde_json::from_value(json!({ "unrelated": true })).unwrap();
        assert!(patch.is_empty());
        let mut device = sample();
        let before = device.clone();
        patch.apply_to(&mut device);
        assert_eq!(device, before);
    }

    #[test]
    fn restore_response_uses_ui_field_names() {
        let body = serde_json::to_value(RestoreResponse {
            restored: true,
            id: DeviceId(3),
            preserved_id: false,
        })
        .unwrap();
        assert_eq!(body, json!({ "restored": true, "id": 3, "preservedId": false }));
    }
}
