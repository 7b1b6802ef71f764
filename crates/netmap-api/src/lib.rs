//! HTTP surface for network-mapper devices: router, configuration, error mapping.

pub mod config;
pub mod error;
pub mod server;
