//! Snapshot codec: detached copies of a device taken at delete time, and the
//! normalization of restore payloads back into that shape.

use crate::{Device, DeviceId, LifecycleError, DEFAULT_DEVICE_TYPE};
use serde::{Deserialize, Serialize};

/// Keys a restore payload may carry. Anything else is dropped.
pub const SNAPSHOT_KEYS: [&str; 11] = [
    "id",
    "name",
    "ip",
    "device_type",
    "building_id",
    "floorplan_id",
    "x",
    "y",
    "note",
    "mac",
    "room",
];

/// Field values of a device at the moment it was deleted (or, for update, right before it
/// changed). `id` is only a hint when the snapshot is restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Option<DeviceId>,
    pub name: Option<String>,
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

#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    id: Option<DeviceId>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    device_type: Option<String>,
    #[serde(default)]
    building_id: Option<i64>,
    #[serde(default)]
    floorplan_id: Option<i64>,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    mac: Option<String>,
    #[serde(default)]
    room: Option<String>,
}

impl From<&Device> for Snapshot {
    fn from(d: &Device) -> Self {
        Snapshot {
            id: Some(d.id),
            name: Some(d.name.clone()),
            ip: d.ip.clone(),
            device_type: d.device_type.clone(),
            building_id: d.building_id,
            floorplan_id: d.floorplan_id,
            x: d.x,
            y: d.y,
            note: d.note.clone(),
            mac: d.mac.clone(),
            room: d.room.clone(),
        }
    }
}

impl Snapshot {
    /// Same snapshot without an identity preference.
    pub fn without_id(mut self) -> Self {
        self.id = None;
        self
    }
}

/// Project every field of `device`, identity included.
pub fn capture(device: &Device) -> Snapshot {
    Snapshot::from(device)
}

/// Accept `{ "snapshot": { ... } }` as well as a bare snapshot object.
pub fn unwrap_restore_payload(body: &serde_json::Value) -> &serde_json::Value {
    match body.get("snapshot") {
        Some(inner) if inner.is_object() => inner,
        _ => body,
    }
}

/// Turn a loosely-typed restore payload into a [`Snapshot`].
///
/// Fails when the payload is not an object, is empty, or a recognized key holds a value of
/// the wrong type. An empty or missing `device_type` becomes `"unknown"`.
pub fn normalize(raw: &serde_json::Value) -> Result<Snapshot, LifecycleError> {
    let map = raw
        .as_object()
        .ok_or_else(|| LifecycleError::InvalidSnapshot("snapshot must be an object".to_string()))?;
    if map.is_empty() {
        return Err(LifecycleError::InvalidSnapshot(
            "snapshot is empty".to_string(),
        ));
    }
    let allowed: serde_json::Map<String, serde_json::Value> = SNAPSHOT_KEYS
        .iter()
        .filter_map(|k| map.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect();
    let parsed: RawSnapshot = serde_json::from_value(serde_json::Value::Object(allowed))
        .map_err(|e| LifecycleError::InvalidSnapshot(e.to_string()))?;
    Ok(Snapshot {
        id: parsed.id,
        name: parsed.name,
        ip: parsed.ip,
        device_type: parsed
            .device_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_DEVICE_TYPE.to_string()),
        building_id: parsed.building_id,
        floorplan_id: parsed.floorplan_id,
        x: parsed.x,
        y: parsed.y,
        note: parsed.note,
        mac: parsed.mac,
        room: parsed.room,
    })
}
