//! SQLite-backed device store and audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netmap_types::{
    next_audit_timestamp, AuditAction, AuditAppend, AuditEntry, AuditListOptions, AuditStore,
    AuditStoreError, Device, DeviceId, DevicePatch, DeviceStore, DeviceStoreError, NewDevice,
};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const DEVICE_COLUMNS: &str =
    "id, name, ip, device_type, building_id, floorplan_id, x, y, note, mac, room, created";

fn open(path: impl AsRef<Path>) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    // The device store and the audit log may point at the same file.
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn is_primary_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn parse_created(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn device_from_row(row: &rusqlite::Row) -> Result<Device, rusqlite::Error> {
    let created: String = row.get(11)?;
    Ok(Device {
        id: DeviceId(row.get(0)?),
        name: row.get(1)?,
        ip: row.get(2)?,
        device_type: row.get(3)?,
        building_id: row.get(4)?,
        floorplan_id: row.get(5)?,
        x: row.get(6)?,
        y: row.get(7)?,
        note: row.get(8)?,
        mac: row.get(9)?,
        room: row.get(10)?,
        created: parse_created(11, &created)?,
    })
}

fn select_device(
    conn: &rusqlite::Connection,
    id: DeviceId,
) -> Result<Option<Device>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1"),
        [id.get()],
        device_from_row,
    )
    .optional()
}

fn insert_generated(conn: &rusqlite::Connection, d: &NewDevice) -> Result<Device, rusqlite::Error> {
    let created = Utc::now();
    conn.execute(
        "INSERT INTO devices (name, ip, device_type, building_id, floorplan_id, x, y, note, mac, room, created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            d.name,
            d.ip,
            d.device_type,
            d.building_id,
            d.floorplan_id,
            d.x,
            d.y,
            d.note,
            d.mac,
            d.room,
            created.to_rfc3339(),
        ],
    )?;
    Ok(d.clone()
        .into_device(DeviceId(conn.last_insert_rowid()), created))
}

/// SQLite-backed device store. `id` is an `INTEGER PRIMARY KEY`, so SQLite generates ids
/// and the primary-key constraint settles competing explicit-id inserts.
pub struct SqliteDeviceStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteDeviceStore {
    /// Create a new SQLite device store at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DeviceStoreError> {
        let conn = open(path).map_err(|e| DeviceStoreError::Other(e.to_string()))?;
        Self::with_schema(conn)
    }

    pub fn open_in_memory() -> Result<Self, DeviceStoreError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| DeviceStoreError::Other(e.to_string()))?;
        Self::with_schema(conn)
    }

    fn with_schema(conn: rusqlite::Connection) -> Result<Self, DeviceStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                ip TEXT,
                device_type TEXT NOT NULL,
                building_id INTEGER,
                floorplan_id INTEGER,
                x REAL,
                y REAL,
                note TEXT,
                mac TEXT,
                room TEXT,
                created TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_devices_building ON devices(building_id);
            CREATE INDEX IF NOT EXISTS idx_devices_floorplan ON devices(floorplan_id);
            "#,
        )
        .map_err(|e| DeviceStoreError::Other(e.to_string()))?;

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, DeviceStoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DeviceStoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| DeviceStoreError::Other(e.to_string()))
    }
}

#[async_trait]
impl DeviceStore for SqliteDeviceStore {
    async fn get(&self, id: DeviceId) -> Result<Option<Device>, DeviceStoreError> {
        self.with_conn(|conn| select_device(conn, id))
    }

    async fn list(&self) -> Result<Vec<Device>, DeviceStoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY id"))?;
            let rows = stmt.query_map([], device_from_row)?;
            rows.collect()
        })
    }

    async fn insert(&self, device: &NewDevice) -> Result<Device, DeviceStoreError> {
        self.with_conn(|conn| insert_generated(conn, device))
    }

    async fn insert_with_id(
        &self,
        id: DeviceId,
        device: &NewDevice,
    ) -> Result<Device, DeviceStoreError> {
        let created = Utc::now();
        let inserted = self.with_conn(|conn| {
            let res = conn.execute(
                "INSERT INTO devices (id, name, ip, device_type, building_id, floorplan_id, x, y, note, mac, room, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    id.get(),
                    device.name,
                    device.ip,
                    device.device_type,
                    device.building_id,
                    device.floorplan_id,
                    device.x,
                    device.y,
                    device.note,
                    device.mac,
                    device.room,
                    created.to_rfc3339(),
                ],
            );
            match res {
                Ok(_) => Ok(true),
                Err(e) if is_primary_key_violation(&e) => Ok(false),
                Err(e) => Err(e),
            }
        })?;
        if inserted {
            Ok(device.clone().into_device(id, created))
        } else {
            Err(DeviceStoreError::IdentityConflict(id))
        }
    }

    async fn insert_batch(&self, devices: &[NewDevice]) -> Result<Vec<DeviceId>, DeviceStoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut ids = Vec::with_capacity(devices.len());
            for device in devices {
                ids.push(insert_generated(&tx, device)?.id);
            }
            tx.commit()?;
            Ok(ids)
        })
    }

    async fn update(&self, id: DeviceId, patch: &DevicePatch) -> Result<Device, DeviceStoreError> {
        let previous = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(previous) = select_device(&tx, id)? else {
                return Ok(None);
            };
            let mut next = previous.clone();
            patch.apply_to(&mut next);
            tx.execute(
                "UPDATE devices SET name = ?2, ip = ?3, device_type = ?4, building_id = ?5,
                 floorplan_id = ?6, x = ?7, y = ?8, note = ?9, mac = ?10, room = ?11
                 WHERE id = ?1",
                params![
                    id.get(),
                    next.name,
                    next.ip,
                    next.device_type,
                    next.building_id,
                    next.floorplan_id,
                    next.x,
                    next.y,
                    next.note,
                    next.mac,
                    next.room,
                ],
            )?;
            tx.commit()?;
            Ok(Some(previous))
        })?;
        previous.ok_or(DeviceStoreError::NotFound(id))
    }

    async fn delete(&self, id: DeviceId) -> Result<Device, DeviceStoreError> {
        let removed = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(row) = select_device(&tx, id)? else {
                return Ok(None);
            };
            tx.execute("DELETE FROM devices WHERE id = ?1", [id.get()])?;
            tx.commit()?;
            Ok(Some(row))
        })?;
        removed.ok_or(DeviceStoreError::NotFound(id))
    }

    async fn delete_if_unchanged(&self, expected: &Device) -> Result<bool, DeviceStoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            if select_device(&tx, expected.id)?.as_ref() != Some(expected) {
                return Ok(false);
            }
            tx.execute("DELETE FROM devices WHERE id = ?1", [expected.id.get()])?;
            tx.commit()?;
            Ok(true)
        })
    }
}

fn audit_from_row(row: &rusqlite::Row) -> Result<AuditEntry, rusqlite::Error> {
    let action: String = row.get(1)?;
    let micros: i64 = row.get(5)?;
    Ok(AuditEntry {
        id: row.get::<_, i64>(0)? as u64,
        action: AuditAction::parse(&action).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown audit action: {}", action).into(),
            )
        })?,
        requested_id: row.get::<_, Option<i64>>(2)?.map(DeviceId),
        restored_id: DeviceId(row.get(3)?),
        preserved: row.get(4)?,
        timestamp: DateTime::from_timestamp_micros(micros).ok_or(
            rusqlite::Error::IntegralValueOutOfRange(5, micros),
        )?,
    })
}

/// SQLite-backed audit log. Timestamps are stored as microseconds since the epoch so the
/// cutoff comparison is numeric; `AUTOINCREMENT` keeps sequence numbers unique across cleanups.
pub struct SqliteAuditStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteAuditStore {
    /// Create a new SQLite audit log at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditStoreError> {
        let conn = open(path).map_err(|e| AuditStoreError::Other(e.to_string()))?;
        Self::with_schema(conn)
    }

    pub fn open_in_memory() -> Result<Self, AuditStoreError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| AuditStoreError::Other(e.to_string()))?;
        Self::with_schema(conn)
    }

    fn with_schema(conn: rusqlite::Connection) -> Result<Self, AuditStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                requested_id INTEGER,
                restored_id INTEGER NOT NULL,
                preserved INTEGER NOT NULL,
                ts_micros INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_ts ON audit_log(ts_micros, id);
            "#,
        )
        .map_err(|e| AuditStoreError::Other(e.to_string()))?;

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, AuditStoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AuditStoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| AuditStoreError::Other(e.to_string()))
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, entry: AuditAppend) -> Result<AuditEntry, AuditStoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let last: Option<i64> =
                tx.query_row("SELECT MAX(ts_micros) FROM audit_log", [], |row| row.get(0))?;
            let timestamp =
                next_audit_timestamp(last.and_then(DateTime::from_timestamp_micros));
            tx.execute(
                "INSERT INTO audit_log (action, requested_id, restored_id, preserved, ts_micros)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.action.as_str(),
                    entry.requested_id.map(DeviceId::get),
                    entry.restored_id.get(),
                    entry.preserved,
                    timestamp.timestamp_micros(),
                ],
            )?;
            let id = tx.last_insert_rowid() as u64;
            tx.commit()?;
            Ok(AuditEntry {
                id,
                action: entry.action,
                requested_id: entry.requested_id,
                restored_id: entry.restored_id,
                preserved: entry.preserved,
                timestamp,
            })
        })
    }

    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let since = opts.since.map(|t| t.timestamp_micros());
        let until = opts.until.map(|t| t.timestamp_micros());
        // SQLite reads LIMIT -1 as "no limit". Larger values than i64 holds saturate.
        let limit = opts
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        let offset = i64::try_from(opts.offset.unwrap_or(0)).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, action, requested_id, restored_id, preserved, ts_micros
                 FROM audit_log
                 WHERE (?1 IS NULL OR ts_micros >= ?1) AND (?2 IS NULL OR ts_micros < ?2)
                 ORDER BY ts_micros, id
                 LIMIT ?3 OFFSET ?4",
            )?;
            let rows = stmt.query_map(params![since, until, limit, offset], audit_from_row)?;
            rows.collect()
        })
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<usize, AuditStoreError> {
        let cutoff = before.timestamp_micros();
        self.with_conn(|conn| conn.execute("DELETE FROM audit_log WHERE ts_micros < ?1", [cutoff]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use netmap_types::RestoreOutcome;

    fn new_device(name: &str) -> NewDevice {
        NewDevice {
            name: name.to_string(),
            ip: Some("10.0.0.5".to_string()),
            device_type: "switch".to_string(),
            building_id: Some(3),
            floorplan_id: None,
            x: Some(0.25),
            y: None,
            note: None,
            mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
            room: Some("Lab-A".to_string()),
        }
    }

    #[tokio::test]
    async fn insert_get_update_delete_roundtrip() {
        let store = SqliteDeviceStore::open_in_memory().unwrap();
        let id = store.insert(&new_device("Sw1")).await.unwrap().id;
        let got = store.get(id).await.unwrap().unwrap();
        assert_eq!(got.name, "Sw1");
        assert_eq!(got.mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));

        let patch = DevicePatch {
            ip: Some(None),
            note: Some(Some("moved".to_string())),
            ..Default::default()
        };
        let prev = store.update(id, &patch).await.unwrap();
        assert_eq!(prev.ip.as_deref(), Some("10.0.0.5"));
        let now = store.get(id).await.unwrap().unwrap();
        assert_eq!(now.ip, None);
        assert_eq!(now.note.as_deref(), Some("moved"));
        assert_eq!(now.room.as_deref(), Some("Lab-A"));

        let removed = store.delete(id).await.unwrap();
        assert_eq!(removed.note.as_deref(), Some("moved"));
        assert!(store.get(id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(id).await.unwrap_err(),
            DeviceStoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn explicit_id_insert_reports_conflict() {
        let store = SqliteDeviceStore::open_in_memory().unwrap();
        let id = store.insert(&new_device("a")).await.unwrap().id;
        let err = store.insert_with_id(id, &new_device("b")).await.unwrap_err();
        assert!(matches!(err, DeviceStoreError::IdentityConflict(x) if x == id));

        store.delete(id).await.unwrap();
        store.insert_with_id(id, &new_device("b")).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().unwrap().name, "b");
    }

    #[tokio::test]
    async fn inserted_row_reads_back_identical() {
        let store = SqliteDeviceStore::open_in_memory().unwrap();
        let row = store.insert(&new_device("Sw1")).await.unwrap();
        assert_eq!(store.get(row.id).await.unwrap(), Some(row.clone()));
        let pinned = store
            .insert_with_id(DeviceId(77), &new_device("pinned"))
            .await
            .unwrap();
        assert_eq!(store.get(DeviceId(77)).await.unwrap(), Some(pinned));
    }

    #[tokio::test]
    async fn delete_if_unchanged_spares_replaced_rows() {
        let store = SqliteDeviceStore::open_in_memory().unwrap();
        let original = store
            .insert_with_id(DeviceId(5), &new_device("mine"))
            .await
            .unwrap();
        store.delete(DeviceId(5)).await.unwrap();
        store
            .insert_with_id(DeviceId(5), &new_device("theirs"))
            .await
            .unwrap();
        assert!(!store.delete_if_unchanged(&original).await.unwrap());
        assert_eq!(store.get(DeviceId(5)).await.unwrap().unwrap().name, "theirs");

        let fresh = store.insert(&new_device("fresh")).await.unwrap();
        assert!(store.delete_if_unchanged(&fresh).await.unwrap());
        assert!(store.get(fresh.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn generated_ids_survive_a_row_at_the_top_of_the_range() {
        let store = SqliteDeviceStore::open_in_memory().unwrap();
        store
            .insert_with_id(DeviceId(i64::MAX), &new_device("edge"))
            .await
            .unwrap();
        let next = store.insert(&new_device("next")).await.unwrap().id;
        assert_ne!(next, DeviceId(i64::MAX));
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn batch_insert_assigns_distinct_ids() {
        let store = SqliteDeviceStore::open_in_memory().unwrap();
        let ids = store
            .insert_batch(&[new_device("a"), new_device("b"), new_device("c")])
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids[0] < ids[1] && ids[1] < ids[2]);
        assert_eq!(store.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn audit_append_list_and_cleanup() {
        let store = SqliteAuditStore::open_in_memory().unwrap();
        let outcome = RestoreOutcome {
            id: DeviceId(7),
            preserved: true,
        };
        let first = store
            .append(AuditAppend::restore(Some(DeviceId(7)), outcome))
            .await
            .unwrap();
        let second = store
            .append(AuditAppend::restore(
                None,
                RestoreOutcome {
                    id: DeviceId(8),
                    preserved: false,
                },
            ))
            .await
            .unwrap();
        assert!(second.id > first.id);
        assert!(second.timestamp >= first.timestamp);

        let all = store.list(&AuditListOptions::default()).await.unwrap();
        assert_eq!(all, vec![first.clone(), second.clone()]);
        assert_eq!(all[1].requested_id, None);

        assert_eq!(store.cleanup(first.timestamp).await.unwrap(), 0);
        let cutoff = second.timestamp + ChronoDuration::microseconds(1);
        assert_eq!(store.cleanup(cutoff).await.unwrap(), 2);
        assert_eq!(store.cleanup(cutoff).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn audit_list_honours_window() {
        let store = SqliteAuditStore::open_in_memory().unwrap();
        let mut entries = Vec::new();
        for i in 0..4 {
            entries.push(
                store
                    .append(AuditAppend::restore(
                        Some(DeviceId(i)),
                        RestoreOutcome {
                            id: DeviceId(i),
                            preserved: true,
                        },
                    ))
                    .await
                    .unwrap(),
            );
        }
        let page = store
            .list(&AuditListOptions {
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page, entries[1..3].to_vec());

        let since_last = store
            .list(&AuditListOptions {
                since: Some(entries[3].timestamp),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(since_last.contains(&entries[3]));
    }

    #[tokio::test]
    async fn oversized_offset_and_limit_saturate() {
        let store = SqliteAuditStore::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .append(AuditAppend::restore(
                    None,
                    RestoreOutcome {
                        id: DeviceId(i),
                        preserved: false,
                    },
                ))
                .await
                .unwrap();
        }
        let past_end = store
            .list(&AuditListOptions {
                offset: Some(usize::MAX),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(past_end.is_empty());

        let unbounded = store
            .list(&AuditListOptions {
                limit: Some(usize::MAX),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unbounded.len(), 3);
    }
}
