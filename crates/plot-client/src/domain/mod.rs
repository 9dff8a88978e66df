//! # Domain Layer - Plotthread Client
//!
//! ## Components
//!
//! - `cache`: EntityCache with per-key maps and snapshot singletons
//! - `graph`: GraphView builder and the indexed InteractiveGraphView
//! - `focus`: GraphFocus state machine for the focal key
//! - `keyring`: KeyRing of the user's public keys
//! - `errors`: ClientError and friends

pub mod cache;
pub mod errors;
pub mod focus;
pub mod graph;
pub mod keyring;

pub use cache::*;
pub use errors::*;
pub use focus::*;
pub use graph::*;
pub use keyring::*;
