//! In-memory device store.

use chrono::{DateTime, Utc};
use netmap_types::{Device, DeviceId, DevicePatch, DeviceStore, DeviceStoreError, NewDevice};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

struct DeviceTable {
    rows: BTreeMap<DeviceId, Device>,
    /// Highest id handed out; generated ids are not reissued until the range runs out.
    last_id: i64,
}

impl DeviceTable {
    /// One past the highest id seen. Once that passes `i64::MAX` (an explicit id can sit
    /// there), fall back to the lowest free positive id.
    fn next_id(&mut self) -> Result<DeviceId, DeviceStoreError> {
        let max_present = self.rows.keys().next_back().map(|id| id.get()).unwrap_or(0);
        if let Some(next) = self.last_id.max(max_present).checked_add(1) {
            self.last_id = next;
            return Ok(DeviceId(next));
        }
        self.last_id = i64::MAX;
        (1..=i64::MAX)
            .map(DeviceId)
            .find(|id| !self.rows.contains_key(id))
            .ok_or_else(|| DeviceStoreError::Other("id space exhausted".to_string()))
    }

    fn put(&mut self, id: DeviceId, device: &NewDevice, created: DateTime<Utc>) -> Device {
        let row = device.clone().into_device(id, created);
        self.rows.insert(id, row.clone());
        row
    }
}

/// In-memory implementation of DeviceStore.
/// Each call holds the table lock for its whole read-modify-write, so a call is atomic.
pub struct InMemoryDeviceStore {
    table: RwLock<DeviceTable>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(DeviceTable {
                rows: BTreeMap::new(),
                last_id: 0,
            }),
        }
    }
}

impl Default for InMemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn get(&self, id: DeviceId) -> Result<Option<Device>, DeviceStoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Device>, DeviceStoreError> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn insert(&self, device: &NewDevice) -> Result<Device, DeviceStoreError> {
        let mut table = self.table.write().await;
        let id = table.next_id()?;
        Ok(table.put(id, device, Utc::now()))
    }

    async fn insert_with_id(
        &self,
        id: DeviceId,
        device: &NewDevice,
    ) -> Result<Device, DeviceStoreError> {
        let mut table = self.table.write().await;
        if table.rows.contains_key(&id) {
            return Err(DeviceStoreError::IdentityConflict(id));
        }
        Ok(table.put(id, device, Utc::now()))
    }

    async fn insert_batch(&self, devices: &[NewDevice]) -> Result<Vec<DeviceId>, DeviceStoreError> {
        let mut table = self.table.write().await;
        let now = Utc::now();
        let mut ids = Vec::with_capacity(devices.len());
        for device in devices {
            match table.next_id() {
                Ok(id) => {
                    table.put(id, device, now);
                    ids.push(id);
                }
                Err(e) => {
                    for id in &ids {
                        table.rows.remove(id);
                    }
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }

    async fn update(&self, id: DeviceId, patch: &DevicePatch) -> Result<Device, DeviceStoreError> {
        let mut table = self.table.write().await;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or(DeviceStoreError::NotFound(id))?;
        let previous = row.clone();
        patch.apply_to(row);
        Ok(previous)
    }

    async fn delete(&self, id: DeviceId) -> Result<Device, DeviceStoreError> {
        self.table
            .write()
            .await
            .rows
            .remove(&id)
            .ok_or(DeviceStoreError::NotFound(id))
    }

    async fn delete_if_unchanged(&self, expected: &Device) -> Result<bool, DeviceStoreError> {
        let mut table = self.table.write().await;
        if table.rows.get(&expected.id) != Some(expected) {
            return Ok(false);
        }
        table.rows.remove(&expected.id);
        Ok(true)
    }
}
