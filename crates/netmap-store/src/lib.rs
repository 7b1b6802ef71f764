//! Device record stores and audit logs: in-memory, plus SQLite behind the `sqlite` feature.

mod audit;
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use audit::InMemoryAuditStore;
pub use memory::InMemoryDeviceStore;
pub use netmap_types::{
    AuditAppend, AuditEntry, AuditListOptions, AuditStore, AuditStoreError, Device, DeviceId,
    DevicePatch, DeviceStore, DeviceStoreError, NewDevice,
};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteAuditStore, SqliteDeviceStore};
