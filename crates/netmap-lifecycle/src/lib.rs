//! Device lifecycle manager over a record store and an audit log.

mod manager;

pub use manager::DeviceManager;
