//! Traits for the device lifecycle and its storage backends.

use crate::{
    AdminGrant, AuditAppend, AuditEntry, AuditListOptions, Device, DeviceDraft, DeviceId,
    DevicePatch, NewDevice, RestoreOutcome, Snapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Record store for device rows. Every method is one atomic unit.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Get one device by id.
    async fn get(&self, id: DeviceId) -> Result<Option<Device>, DeviceStoreError>;

    /// All devices, ordered by id.
    async fn list(&self) -> Result<Vec<Device>, DeviceStoreError>;

    /// Insert with a store-generated id; returns the stored row.
    async fn insert(&self, device: &NewDevice) -> Result<Device, DeviceStoreError>;

    /// Insert under `id` and return the stored row. Fails with `IdentityConflict` if a row
    /// already holds it; the uniqueness check and the write happen together.
    async fn insert_with_id(
        &self,
        id: DeviceId,
        device: &NewDevice,
    ) -> Result<Device, DeviceStoreError>;

    /// Insert many rows with generated ids; all or nothing.
    async fn insert_batch(&self, devices: &[NewDevice]) -> Result<Vec<DeviceId>, DeviceStoreError>;

    /// Apply `patch` and return the row as it was before.
    async fn update(&self, id: DeviceId, patch: &DevicePatch) -> Result<Device, DeviceStoreError>;

    /// Remove the row and return it.
    async fn delete(&self, id: DeviceId) -> Result<Device, DeviceStoreError>;

    /// Remove the row at `expected.id` only if it still equals `expected` (same `created`
    /// stamp, no update since). Returns whether a row was removed.
    async fn delete_if_unchanged(&self, expected: &Device) -> Result<bool, DeviceStoreError>;
}

/// Append-only audit log with cutoff cleanup.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one entry; the store assigns sequence number and timestamp.
    async fn append(&self, entry: AuditAppend) -> Result<AuditEntry, AuditStoreError>;

    /// Entries matching `opts`, oldest first.
    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditEntry>, AuditStoreError>;

    /// Remove entries with `timestamp < before`; returns how many were removed.
    async fn cleanup(&self, before: DateTime<Utc>) -> Result<usize, AuditStoreError>;
}

/// Device lifecycle: create, update, delete with snapshot, restore with identity preservation.
#[async_trait]
pub trait DeviceLifecycle: Send + Sync {
    /// Create a device; returns the generated id.
    async fn create(&self, draft: DeviceDraft) -> Result<DeviceId, LifecycleError>;

    async fn get(&self, id: DeviceId) -> Result<Device, LifecycleError>;

    async fn list(&self) -> Result<Vec<Device>, LifecycleError>;

    /// Apply a partial update; returns the previous state.
    async fn update(&self, id: DeviceId, patch: DevicePatch) -> Result<Snapshot, LifecycleError>;

    /// Delete a device; returns the snapshot needed to restore it.
    async fn delete(&self, id: DeviceId) -> Result<Snapshot, LifecycleError>;

    /// Recreate a deleted device, under its old id when that id is still free.
    async fn restore(&self, snapshot: Snapshot) -> Result<RestoreOutcome, LifecycleError>;

    /// Create many devices at once; returns how many were created.
    async fn import(&self, drafts: Vec<DeviceDraft>) -> Result<usize, LifecycleError>;

    async fn audit_list(
        &self,
        grant: &AdminGrant,
        opts: &AuditListOptions,
    ) -> Result<Vec<AuditEntry>, LifecycleError>;

    async fn audit_cleanup(
        &self,
        grant: &AdminGrant,
        before: DateTime<Utc>,
    ) -> Result<usize, LifecycleError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceStoreError {
    #[error("device not found: {0}")]
    NotFound(DeviceId),
    #[error("device id already in use: {0}")]
    IdentityConflict(DeviceId),
    #[error("device store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuditStoreError {
    #[error("audit store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("device not found: {0}")]
    NotFound(DeviceId),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("restore failed: {0}")]
    RestoreFailed(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("store: {0}")]
    Store(#[from] DeviceStoreError),
    #[error("audit: {0}")]
    Audit(#[from] AuditStoreError),
}
