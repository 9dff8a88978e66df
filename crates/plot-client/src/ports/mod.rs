//! Ports layer for the plotthread client.
//!
//! - Inbound (Driving) ports: events that drive the client
//! - Outbound (Driven) ports: the socket, signing, DOT parsing and storage

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
