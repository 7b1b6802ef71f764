//! In-memory audit log (process lifetime only).

use chrono::{DateTime, Utc};
use netmap_types::{
    next_audit_timestamp, AuditAppend, AuditEntry, AuditListOptions, AuditStore, AuditStoreError,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct AuditLog {
    entries: Vec<AuditEntry>,
    next_seq: u64,
    /// Timestamp of the newest append, kept even after cleanup removes that entry.
    last_timestamp: Option<DateTime<Utc>>,
}

/// In-memory implementation of AuditStore. Entries stay in append order, which is also
/// timestamp order.
pub struct InMemoryAuditStore {
    log: RwLock<AuditLog>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(AuditLog::default()),
        }
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditAppend) -> Result<AuditEntry, AuditStoreError> {
        let mut log = self.log.write().await;
        log.next_seq += 1;
        let timestamp = next_audit_timestamp(log.last_timestamp);
        log.last_timestamp = Some(timestamp);
        let stored = AuditEntry {
            id: log.next_seq,
            action: entry.action,
            requested_id: entry.requested_id,
            restored_id: entry.restored_id,
            preserved: entry.preserved,
            timestamp,
        };
        log.entries.push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let log = self.log.read().await;
        let offset = opts.offset.unwrap_or(0);
        let limit = opts.limit.unwrap_or(usize::MAX);
        Ok(log
            .entries
            .iter()
            .filter(|e| opts.matches(e))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<usize, AuditStoreError> {
        let mut log = self.log.write().await;
        let len = log.entries.len();
        log.entries.retain(|e| e.timestamp >= before);
        Ok(len - log.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use netmap_types::{DeviceId, RestoreOutcome};

    fn restore_entry(id: i64, preserved: bool) -> AuditAppend {
        AuditAppend::restore(
            Some(DeviceId(id)),
            RestoreOutcome {
                id: DeviceId(id),
                preserved,
            },
        )
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequence_and_time() {
        let store = InMemoryAuditStore::new();
        let a = store.append(restore_entry(1, true)).await.unwrap();
        let b = store.append(restore_entry(2, false)).await.unwrap();
        assert!(b.id > a.id);
        assert!(b.timestamp >= a.timestamp);

        let all = store.list(&AuditListOptions::default()).await.unwrap();
        assert_eq!(all, vec![a, b]);
    }

    #[tokio::test]
    async fn cleanup_is_strict_and_idempotent() {
        let store = InMemoryAuditStore::new();
        let first = store.append(restore_entry(1, true)).await.unwrap();
        let second = store.append(restore_entry(2, true)).await.unwrap();

        // Cutoff equal to the entry keeps it.
        assert_eq!(store.cleanup(first.timestamp).await.unwrap(), 0);

        let cutoff = second.timestamp + Duration::microseconds(1);
        assert_eq!(store.cleanup(cutoff).await.unwrap(), 2);
        assert_eq!(store.cleanup(cutoff).await.unwrap(), 0);
        assert!(store
            .list(&AuditListOptions::default())
            .await
            .unwrap()
            .is_empty());

        let third = store.append(restore_entry(3, false)).await.unwrap();
        assert!(third.id > second.id);
        assert!(third.timestamp >= second.timestamp);
    }

    #[tokio::test]
    async fn list_applies_offset_and_limit_after_filter() {
        let store = InMemoryAuditStore::new();
        for i in 0..5 {
            store.append(restore_entry(i, true)).await.unwrap();
        }
        let page = store
            .list(&AuditListOptions {
                offset: Some(1),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|e| e.restored_id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn offset_past_the_end_returns_nothing() {
        let store = InMemoryAuditStore::new();
        store.append(restore_entry(1, true)).await.unwrap();
        let page = store
            .list(&AuditListOptions {
                offset: Some(usize::MAX),
                limit: Some(usize::MAX),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.is_empty());
    }
}
