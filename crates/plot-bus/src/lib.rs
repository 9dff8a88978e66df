//! # Plot Bus - Correlation Signals
//!
//! The wire protocol has no request identifiers. A caller that fired a
//! request and needs to know that *its* response landed, rather than that
//! the cache changed for any reason, subscribes here for signals carrying the
//! key or id it asked about.
//!
//! ```text
//! ┌──────────────┐  publish()   ┌────────────────┐  subscribe(filter)  ┌──────────┐
//! │ Inbound      │ ───────────→ │ CorrelationBus │ ──────────────────→ │ Caller   │
//! │ Router       │              │  (broadcast)   │                     │ (view)   │
//! └──────────────┘              └────────────────┘                     └──────────┘
//! ```
//!
//! ## Delivery
//!
//! - **At most once, best effort:** a response lost to a dropped connection
//!   never produces a signal. Callers apply their own timeout.
//! - **Handle-scoped:** dropping a [`Subscription`] unsubscribes it. A
//!   leaked handle never keeps the bus alive.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod publisher;
pub mod signals;
pub mod subscriber;

// Re-export main types
pub use publisher::{CorrelationBus, SignalPublisher};
pub use signals::{CorrelationKey, Signal, SignalFilter, SignalKind};
pub use subscriber::{SignalStream, Subscription, SubscriptionError};

/// Maximum signals buffered per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
