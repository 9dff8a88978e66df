//! # Plot Types
//!
//! Types shared by every plotthread client crate: the JSON wire envelope,
//! the ledger entities carried inside it and the wire-form public key.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: request and response payloads are defined
//!   once here and consumed by the client, the bus and the CLI.
//! - **Canonical Naming**: the client speaks of *blocks*, *exchanges*,
//!   *balances* and *scores*. Field variants seen on nodes (`interactions`,
//!   `representations`, `imbalance`, `rank`) are accepted as serde aliases.
//! - **Exact Keys**: a [`PublicKey`] keeps its wire string untouched so cache
//!   entries never collide through normalization.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod keys;

pub use entities::*;
pub use envelope::{kinds, Envelope, Inbound, Request, SUBPROTOCOL};
pub use errors::*;
pub use keys::PublicKey;
