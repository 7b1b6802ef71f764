//! DeviceManager: the lifecycle policy layered over a DeviceStore and an AuditStore.

use chrono::{DateTime, Utc};
use netmap_types::*;

/// Lifecycle manager composing a record store and an audit log.
pub struct DeviceManager<S, A> {
    pub store: S,
    pub audit: A,
}

impl<S, A> DeviceManager<S, A>
where
    S: DeviceStore + Send + Sync,
    A: AuditStore + Send + Sync,
{
    pub fn new(store: S, audit: A) -> Self {
        Self { store, audit }
    }

    fn resolve_device_type(device_type: Option<String>) -> String {
        device_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_DEVICE_TYPE.to_string())
    }

    /// Same rule for single create and bulk import: a non-blank name is required.
    fn validate_draft(draft: DeviceDraft) -> Result<NewDevice, LifecycleError> {
        let name = draft
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| LifecycleError::Validation("name required".to_string()))?;
        Ok(NewDevice {
            name,
            ip: draft.ip,
            device_type: Self::resolve_device_type(draft.device_type),
            building_id: draft.building_id,
            floorplan_id: draft.floorplan_id,
            x: draft.x,
            y: draft.y,
            note: draft.note,
            mac: draft.mac,
            room: draft.room,
        })
    }

    fn validate_patch(patch: &DevicePatch) -> Result<(), LifecycleError> {
        match patch.name {
            Some(None) => {
                return Err(LifecycleError::Validation(
                    "name cannot be null".to_string(),
                ))
            }
            Some(Some(ref n)) if n.trim().is_empty() => {
                return Err(LifecycleError::Validation(
                    "name cannot be empty".to_string(),
                ))
            }
            _ => {}
        }
        match patch.device_type {
            Some(None) => Err(LifecycleError::Validation(
                "device_type cannot be null".to_string(),
            )),
            Some(Some(ref t)) if t.is_empty() => Err(LifecycleError::Validation(
                "device_type cannot be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Row to insert for a snapshot. A snapshot without a name cannot satisfy the store's
    /// NOT NULL column, so it fails the restore rather than the payload check.
    fn restorable_row(snapshot: &Snapshot) -> Result<NewDevice, LifecycleError> {
        let name = snapshot
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| LifecycleError::RestoreFailed("snapshot has no name".to_string()))?;
        Ok(NewDevice {
            name,
            ip: snapshot.ip.clone(),
            device_type: Self::resolve_device_type(Some(snapshot.device_type.clone())),
            building_id: snapshot.building_id,
            floorplan_id: snapshot.floorplan_id,
            x: snapshot.x,
            y: snapshot.y,
            note: snapshot.note.clone(),
            mac: snapshot.mac.clone(),
            room: snapshot.room.clone(),
        })
    }

    fn not_found_or_store(err: DeviceStoreError) -> LifecycleError {
        match err {
            DeviceStoreError::NotFound(id) => LifecycleError::NotFound(id),
            other => LifecycleError::Store(other),
        }
    }

    /// Insert the restored row: under `hint` if nobody holds it, otherwise under a fresh id.
    /// The store's uniqueness check at insert time decides, not an earlier read.
    async fn insert_restored(
        &self,
        hint: Option<DeviceId>,
        row: &NewDevice,
    ) -> Result<(Device, bool), DeviceStoreError> {
        if let Some(hint) = hint {
            match self.store.insert_with_id(hint, row).await {
                Ok(inserted) => return Ok((inserted, true)),
                Err(DeviceStoreError::IdentityConflict(_)) => {
                    tracing::debug!(requested = %hint, "device id taken, restoring under a new id");
                }
                Err(e) => return Err(e),
            }
        }
        Ok((self.store.insert(row).await?, false))
    }
}

#[async_trait::async_trait]
impl<S, A> DeviceLifecycle for DeviceManager<S, A>
where
    S: DeviceStore + Send + Sync,
    A: AuditStore + Send + Sync,
{
    async fn create(&self, draft: DeviceDraft) -> Result<DeviceId, LifecycleError> {
        let row = Self::validate_draft(draft)?;
        let id = self.store.insert(&row).await?.id;
        tracing::info!(device_id = %id, device_type = %row.device_type, "device created");
        Ok(id)
    }

    async fn get(&self, id: DeviceId) -> Result<Device, LifecycleError> {
        self.store
            .get(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Device>, LifecycleError> {
        Ok(self.store.list().await?)
    }

    async fn update(&self, id: DeviceId, patch: DevicePatch) -> Result<Snapshot, LifecycleError> {
        if let Err(invalid) = Self::validate_patch(&patch) {
            // An unknown id is reported as such even when the patch is also bad.
            if self.store.get(id).await?.is_none() {
                return Err(LifecycleError::NotFound(id));
            }
            return Err(invalid);
        }
        let previous = self
            .store
            .update(id, &patch)
            .await
            .map_err(Self::not_found_or_store)?;
        tracing::debug!(device_id = %id, "device updated");
        Ok(capture(&previous))
    }

    async fn delete(&self, id: DeviceId) -> Result<Snapshot, LifecycleError> {
        let removed = self
            .store
            .delete(id)
            .await
            .map_err(Self::not_found_or_store)?;
        tracing::info!(device_id = %id, "device deleted");
        Ok(capture(&removed))
    }

    async fn restore(&self, snapshot: Snapshot) -> Result<RestoreOutcome, LifecycleError> {
        let row = Self::restorable_row(&snapshot)?;
        let requested = snapshot.id;
        let (inserted, preserved) = self
            .insert_restored(requested, &row)
            .await
            .map_err(|e| LifecycleError::RestoreFailed(e.to_string()))?;
        let outcome = RestoreOutcome {
            id: inserted.id,
            preserved,
        };

        if let Err(e) = self
            .audit
            .append(AuditAppend::restore(requested, outcome))
            .await
        {
            tracing::warn!(device_id = %outcome.id, error = %e, "audit append failed, rolling back restore");
            // Only undo our own insert: the row may have been deleted, replaced or edited since.
            match self.store.delete_if_unchanged(&inserted).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(device_id = %outcome.id, "restored device changed before rollback, leaving it")
                }
                Err(undo) => {
                    tracing::error!(device_id = %outcome.id, error = %undo, "failed to roll back restored device")
                }
            }
            return Err(LifecycleError::RestoreFailed(format!(
                "audit append failed: {}",
                e
            )));
        }

        tracing::info!(
            requested = ?requested.map(DeviceId::get),
            device_id = %outcome.id,
            preserved = outcome.preserved,
            "device restored"
        );
        Ok(outcome)
    }

    async fn import(&self, drafts: Vec<DeviceDraft>) -> Result<usize, LifecycleError> {
        let rows = drafts
            .into_iter()
            .enumerate()
            .map(|(i, d)| {
                Self::validate_draft(d).map_err(|e| match e {
                    LifecycleError::Validation(msg) => {
                        LifecycleError::Validation(format!("row {}: {}", i + 1, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(0);
        }
        let ids = self.store.insert_batch(&rows).await?;
        tracing::info!(created = ids.len(), "devices imported");
        Ok(ids.len())
    }

    async fn audit_list(
        &self,
        _grant: &AdminGrant,
        opts: &AuditListOptions,
    ) -> Result<Vec<AuditEntry>, LifecycleError> {
        Ok(self.audit.list(opts).await?)
    }

    async fn audit_cleanup(
        &self,
        _grant: &AdminGrant,
        before: DateTime<Utc>,
    ) -> Result<usize, LifecycleError> {
        let removed = self.audit.cleanup(before).await?;
        tracing::info!(removed, before = %before.to_rfc3339(), "audit entries cleaned up");
        Ok(removed)
    }
}
