//! ais-core: Pure decode + tracking library for AIS.
//!
//! No async, no I/O — just algorithms. The `aislog` binary in
//! `ais-server` drives these types from its source, hub and store workers.

pub mod checksum;
pub mod config;
pub mod contacts;
pub mod decode;
pub mod events;
pub mod geo;
pub mod hub;
pub mod mid;
pub mod sentence;
pub mod shiptype;
pub mod snapshot;
pub mod types;

// Re-export commonly used types at crate root
pub use contacts::{Contact, ContactStore, ContactView};
pub use decode::decode;
pub use events::{ChangeEvent, EventDispatcher};
pub use hub::{LineSink, Route, RoutingHub, RoutingMatrix};
pub use sentence::Reassembler;
pub use types::*;
