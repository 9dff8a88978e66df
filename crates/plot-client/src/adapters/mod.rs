//! # Adapters Layer
//!
//! Implementations of the outbound ports.
//!
//! - `websocket`: [`ConnectionManager`], the tokio-tungstenite [`crate::Transport`]
//! - `dot`: [`DotParser`], the default [`crate::GraphParser`]
//! - `storage`: [`MemoryStorage`] and [`JsonFileStorage`] for [`crate::CacheStorage`]

pub mod dot;
pub mod storage;
pub mod websocket;

pub use dot::DotParser;
pub use storage::{JsonFileStorage, MemoryStorage};
pub use websocket::{backoff_delay, ConnectionManager, ConnectionState};
