//! # Plotthread Client Test Suite
//!
//! Cross-crate flows that exercise plot-types, plot-bus and plot-client
//! together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs   # FakeTransport, FakeSigner, frame builders
//!     ├── flows.rs      # Cache, correlation and graph flows
//!     └── live.rs       # ConnectionManager against a local WebSocket server
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p plot-tests
//! cargo test -p plot-tests integration::live
//! ```

pub mod integration;
