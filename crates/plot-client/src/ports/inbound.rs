//! Inbound (Driving) port for the plotthread client.

/// Events delivered from the connection manager to the client event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A socket opened. `generation` increases by one per connection.
    Connected { generation: u64 },
    /// The open socket closed or failed.
    Disconnected,
    /// A text frame arrived.
    Message(String),
}
