//! Core types and traits for the network-mapper device lifecycle.
//!
//! Field names on the wire (`ip`, `device_type`, `building_id`, ...) match the JSON the
//! floorplan UI already sends, so request bodies deserialize straight into these types.

mod auth;
mod dto;
mod lifecycle;
mod snapshot;
mod traits;

pub use auth::*;
pub use dto::*;
pub use lifecycle::*;
pub use snapshot::*;
pub use traits::*;
