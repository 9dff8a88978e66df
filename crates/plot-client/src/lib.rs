//! # Plot Client
//!
//! Client for plotthread ledger nodes. One WebSocket connection is shared by
//! every caller; requests are typed JSON envelopes and responses land in an
//! entity cache that the UI layer reads synchronously.
//!
//! ## Correlation
//!
//! The protocol carries no request ids. A response is paired with its
//! request by type and by the key embedded in the payload, and the router
//! announces each stored response on the correlation bus:
//!
//! ```text
//! caller ──subscribe(for_key)──→ CorrelationBus
//! caller ──fetch_balance(k)────→ RequestDispatcher ──→ Transport ──→ node
//! node ──imbalance{k}──→ ConnectionManager ──→ PlotClient::run
//!                                                │
//!                                  InboundRouter ┴→ EntityCache (upsert k)
//!                                                └→ BalanceLoaded{k} ──→ caller
//! ```
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/websocket.rs - ConnectionManager (tokio-tungstenite)  │
//! │  adapters/dot.rs       - DotParser                              │
//! │  adapters/storage.rs   - MemoryStorage, JsonFileStorage         │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - ConnectionEvent                            │
//! │  ports/outbound.rs - Transport, ExchangeSigner, GraphParser,    │
//! │                      CacheStorage                               │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/cache.rs   - EntityCache, CacheReader, CacheSnapshot    │
//! │  domain/graph.rs   - GraphView, InteractiveGraphView            │
//! │  domain/focus.rs   - GraphFocus state machine                   │
//! │  domain/keyring.rs - KeyRing                                    │
//! │  domain/errors.rs  - ClientError, TransportError, ...           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `dispatcher`, `router` and `client` sit on top and wire the layers
//! together.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod ports;
pub mod router;

pub use adapters::{ConnectionManager, ConnectionState, DotParser, JsonFileStorage, MemoryStorage};
pub use client::{
    FocusedGraph, PlotClient, PlotClientBuilder, SubmitOutcome, SubmitRejection, MAX_MEMO_CHARS,
};
pub use config::{ClientConfig, ConfigError};
pub use dispatcher::{DispatchOutcome, FilterRegistration, RequestDispatcher};
pub use domain::*;
pub use ports::*;
pub use router::InboundRouter;
