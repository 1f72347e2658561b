//! Speaker control, discovery and eventing.
//!
//! Everything that speaks UPnP to the devices lives here: SSDP discovery,
//! SOAP control, zone-group topology parsing and GENA subscriptions.
//!
//! # Module Structure
//!
//! - `types` - Domain types for devices, groups and playback
//! - `services` - UPnP service definitions (URNs, paths)
//! - `traits` - Trait abstractions for testability
//! - `client` - `SonosClientImpl` concrete trait implementation
//! - `zone_groups` - Zone group topology parsing and snapshot building
//! - `didl` - DIDL-Lite metadata parsing
//! - `playback` - Transport commands and queries
//! - `volume` - Group and per-speaker volume/mute control
//! - `grouping` - Group join/leave
//! - `discovery` - SSDP discovery and descriptor fetching
//! - `gena` - GENA subscription lifecycle and typed events
//! - `gena_client` - GENA HTTP operations
//! - `gena_store` - GENA subscription state management
//! - `gena_parser` - GENA notification parsing
//! - `gena_event_builder` - Typed events from parsed notifications
//! - `soap` - Low-level SOAP protocol implementation

pub mod client;
pub(crate) mod didl;
pub mod discovery;
pub mod gena;
pub mod gena_client;
pub mod gena_event_builder;
pub mod gena_parser;
pub mod gena_store;
pub(crate) mod grouping;
pub(crate) mod playback;
pub(crate) mod retry;
pub mod services;
pub mod soap;
pub mod traits;
pub mod types;
pub(crate) mod volume;
pub mod xml;
pub mod zone_groups;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-export domain types
pub use services::SonosService;

// Re-export trait abstractions
pub use traits::{SonosClient, SonosControl, SonosTopologyClient};

// Re-export concrete implementation
pub use client::SonosClientImpl;
